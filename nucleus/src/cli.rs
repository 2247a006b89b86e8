/*
 * SPDX-License-Identifier: BlueOak-1.0.0
 * Copyright (c) Berkus Decker <berkus+vesper@metta.systems>
 */

//! Command line interface (C11): a line-oriented shell running as an
//! ordinary kernel task, forked by `platform_init::init`. Reads one line at
//! a time from the global console, splits it into words, and dispatches to
//! one of a fixed set of illustrative verbs operating on the registry, the
//! task table, and the mounted FAT32 volume.

pub const MAX_LINE_LENGTH: usize = 128;
pub const MAX_ARGS: usize = 8;

/// Split `line` into at most `MAX_ARGS` whitespace-separated words.
fn tokenize<'a>(line: &'a str, out: &mut [&'a str; MAX_ARGS]) -> usize {
    let mut n = 0;
    for word in line.split_whitespace() {
        if n >= MAX_ARGS {
            break;
        }
        out[n] = word;
        n += 1;
    }
    n
}

#[cfg(test)]
mod tokenize_tests {
    use super::*;

    #[test]
    fn splits_on_whitespace() {
        let mut out: [&str; MAX_ARGS] = [""; MAX_ARGS];
        let n = tokenize("list directory /home", &mut out);
        assert_eq!(n, 3);
        assert_eq!(&out[..n], &["list", "directory", "/home"]);
    }

    #[test]
    fn collapses_repeated_spaces() {
        let mut out: [&str; MAX_ARGS] = [""; MAX_ARGS];
        let n = tokenize("  show    diagnostics  ", &mut out);
        assert_eq!(&out[..n], &["show", "diagnostics"]);
    }

    #[test]
    fn empty_line_yields_no_words() {
        let mut out: [&str; MAX_ARGS] = [""; MAX_ARGS];
        assert_eq!(tokenize("", &mut out), 0);
    }

    #[test]
    fn truncates_past_the_argument_limit() {
        let many = "a b c d e f g h i j";
        let mut out: [&str; MAX_ARGS] = [""; MAX_ARGS];
        assert_eq!(tokenize(many, &mut out), MAX_ARGS);
    }
}

#[cfg(target_arch = "aarch64")]
mod live {
    use super::{tokenize, MAX_ARGS, MAX_LINE_LENGTH};
    use fat32::{directory, file, Path, Volume};
    use machine::console::{self, interface::ConsoleOps};

    /// Current working directory, kept as a path string rather than a resolved
    /// cluster so `change directory ..` and redisplay are trivial; resolved to
    /// a cluster fresh on every use.
    pub struct Session {
        path_buf: [u8; fat32::path::MAX_PATH_LENGTH],
        path_len: usize,
    }

    impl Session {
        const fn new() -> Self {
            Self {
                path_buf: [0u8; fat32::path::MAX_PATH_LENGTH],
                path_len: 0,
            }
        }

        fn current_path(&self) -> &str {
            core::str::from_utf8(&self.path_buf[..self.path_len]).unwrap_or("/")
        }

        fn set_path(&mut self, path: &str) {
            let len = path.len().min(self.path_buf.len());
            self.path_buf[..len].copy_from_slice(&path.as_bytes()[..len]);
            self.path_len = len;
        }
    }

    /// Character I/O: read one line from the console into `buf`, stopping at
    /// `delimiter` or when `buf` fills, echoing every character read.
    pub fn getline(buf: &mut [u8], delimiter: u8) -> &[u8] {
        let con = console::console();
        let mut i = 0;
        loop {
            let c = con.read_char();
            if c as u8 == delimiter {
                con.write_char('\n');
                return &buf[..i];
            }
            if i < buf.len() {
                buf[i] = c as u8;
                i += 1;
            }
            con.write_char(c);
        }
    }

    /// One dispatchable CLI verb.
    pub trait Command {
        fn name(&self) -> &'static str;
        fn run(&self, session: &mut Session, args: &[&str]);
    }

    fn entry_display<'a>(entry: &'a directory::DirectoryEntry, buf: &'a mut [u8; 64]) -> &'a str {
        if let Some((name, len)) = &entry.long_name {
            let mut n = 0;
            for &unit in &name[..*len] {
                if n >= buf.len() || unit > 0x7f {
                    break;
                }
                buf[n] = unit as u8;
                n += 1;
            }
            if n == *len {
                return core::str::from_utf8(&buf[..n]).unwrap_or("?");
            }
        }
        let mut short = [0u8; 13];
        let n = entry.short_name_display(&mut short);
        buf[..n].copy_from_slice(&short[..n]);
        core::str::from_utf8(&buf[..n]).unwrap_or("?")
    }

    fn name_matches(entry: &directory::DirectoryEntry, wanted: &str) -> bool {
        let mut buf = [0u8; 64];
        entry_display(entry, &mut buf).eq_ignore_ascii_case(wanted)
    }

    /// Resolve `path` to the first cluster of the directory it names, walking
    /// from the volume root one segment at a time.
    fn resolve_directory(volume: &Volume, path: &str) -> Option<u32> {
        let parsed = Path::parse(path).ok()?;
        let emmc = unsafe { machine::platform::drivers::emmc_mut() };

        let mut cluster = volume.root_cluster;
        for segment in parsed.iter() {
            let mut found = None;
            let _ = directory::visit_directory(&mut *emmc, volume, cluster, |entry| {
                if entry.entry_type == directory::EntryType::Directory && name_matches(entry, segment) {
                    found = Some(entry.first_cluster);
                    directory::VisitControl::Finished
                } else {
                    directory::VisitControl::Continue
                }
            });
            cluster = found?;
        }
        Some(cluster)
    }

    /// Resolve `path` to the cluster of its containing directory plus its
    /// final segment, so `create`/`delete`/`rename` can hand both to
    /// `fat32::file` without re-walking the whole path themselves.
    fn resolve_parent<'a>(volume: &Volume, parsed: &'a Path) -> Option<(u32, &'a str)> {
        let emmc = unsafe { machine::platform::drivers::emmc_mut() };
        let name = parsed.segment(parsed.len().checked_sub(1)?)?;

        let mut cluster = volume.root_cluster;
        for i in 0..parsed.len() - 1 {
            let segment = parsed.segment(i)?;
            let mut found = None;
            let _ = directory::visit_directory(&mut *emmc, volume, cluster, |entry| {
                if entry.entry_type == directory::EntryType::Directory && name_matches(entry, segment) {
                    found = Some(entry.first_cluster);
                    directory::VisitControl::Finished
                } else {
                    directory::VisitControl::Continue
                }
            });
            cluster = found?;
        }
        Some((cluster, name))
    }

    fn cmd_create(args: &[&str]) {
        let (kind, path) = match (args.first().copied(), args.get(1).copied()) {
            (Some(kind @ ("file" | "directory")), Some(path)) => (kind, path),
            _ => {
                machine::println!("usage: create file|directory <path>");
                return;
            }
        };
        let Some(mut volume) = crate::platform_init::volume() else {
            machine::println!("no filesystem mounted");
            return;
        };
        let Ok(parsed) = Path::parse(path) else {
            machine::println!("bad path: {}", path);
            return;
        };
        let Some((parent, name)) = resolve_parent(&volume, &parsed) else {
            machine::println!("no such directory: {}", path);
            return;
        };
        let emmc = unsafe { machine::platform::drivers::emmc_mut() };
        let result = if kind == "directory" {
            file::create_directory(&mut *emmc, &mut volume, parent, name).map(|_| ())
        } else {
            file::create_file(&mut *emmc, &mut volume, parent, name)
        };
        match result {
            Ok(()) => crate::platform_init::set_volume(volume),
            Err(e) => machine::println!("create {}: {}", path, e),
        }
    }

    fn cmd_delete(args: &[&str]) {
        let Some(&path) = args.first() else {
            machine::println!("usage: delete <path>");
            return;
        };
        let Some(mut volume) = crate::platform_init::volume() else {
            machine::println!("no filesystem mounted");
            return;
        };
        let Ok(parsed) = Path::parse(path) else {
            machine::println!("bad path: {}", path);
            return;
        };
        let Some((parent, name)) = resolve_parent(&volume, &parsed) else {
            machine::println!("no such path: {}", path);
            return;
        };
        let emmc = unsafe { machine::platform::drivers::emmc_mut() };
        match file::delete(&mut *emmc, &mut volume, parent, name) {
            Ok(()) => crate::platform_init::set_volume(volume),
            Err(e) => machine::println!("delete {}: {}", path, e),
        }
    }

    fn cmd_rename(args: &[&str]) {
        let (Some(&old_path), Some(&new_name)) = (args.first(), args.get(1)) else {
            machine::println!("usage: rename <path> <new-name>");
            return;
        };
        let Some(mut volume) = crate::platform_init::volume() else {
            machine::println!("no filesystem mounted");
            return;
        };
        let Ok(parsed) = Path::parse(old_path) else {
            machine::println!("bad path: {}", old_path);
            return;
        };
        let Some((parent, old_name)) = resolve_parent(&volume, &parsed) else {
            machine::println!("no such path: {}", old_path);
            return;
        };
        let emmc = unsafe { machine::platform::drivers::emmc_mut() };
        match file::rename(&mut *emmc, &mut volume, parent, old_name, new_name) {
            Ok(()) => crate::platform_init::set_volume(volume),
            Err(e) => machine::println!("rename {}: {}", old_path, e),
        }
    }

    fn cmd_list(session: &mut Session, args: &[&str]) {
        match args.first() {
            Some(&"filesystems") => {
                crate::registry::registry().lock(|r| {
                    for uuid in r.find_entities_by_type(crate::registry::EntityType::Filesystem) {
                        if let Ok(e) = r.get_entity_by_id(uuid) {
                            machine::println!("{}\t{}", e.name(), e.alias());
                        }
                    }
                });
            }
            Some(&"tasks") => {
                crate::task::scheduler::TASKS.lock(|tasks| {
                    tasks.visit_tasks(|task| {
                        machine::println!(
                            "{}\t{:?}\tcounter={}\tpriority={}",
                            task.name(),
                            task.state,
                            task.counter,
                            task.priority
                        );
                        crate::task::Visit::Next
                    });
                });
            }
            Some(&"directory") => {
                let target = args.get(1).copied().unwrap_or_else(|| session.current_path());
                list_directory(target);
            }
            _ => machine::println!("usage: list filesystems|directory [path]|tasks"),
        }
    }

    fn list_directory(path: &str) {
        let Some(volume) = crate::platform_init::volume() else {
            machine::println!("no filesystem mounted");
            return;
        };
        let Some(cluster) = resolve_directory(&volume, path) else {
            machine::println!("no such directory: {}", path);
            return;
        };

        let emmc = unsafe { machine::platform::drivers::emmc_mut() };
        let result = directory::visit_directory(&mut *emmc, &volume, cluster, |entry| {
            let mut buf = [0u8; 64];
            let name = entry_display(entry, &mut buf);
            let marker = if entry.entry_type == directory::EntryType::Directory {
                "/"
            } else {
                ""
            };
            machine::println!("{}{}\t{}", name, marker, entry.size);
            directory::VisitControl::Continue
        });
        if result.is_err() {
            machine::println!("directory read error");
        }
    }

    fn cmd_change(session: &mut Session, args: &[&str]) {
        match (args.first(), args.get(1)) {
            (Some(&"directory"), Some(&path)) => {
                let Some(volume) = crate::platform_init::volume() else {
                    machine::println!("no filesystem mounted");
                    return;
                };
                if resolve_directory(&volume, path).is_some() {
                    session.set_path(path);
                } else {
                    machine::println!("no such directory: {}", path);
                }
            }
            (Some(&"filesystem"), Some(&name)) => {
                let found = crate::registry::registry()
                    .lock(|r| r.get_entity_by_name(name).is_ok());
                if found {
                    session.set_path("/");
                } else {
                    machine::println!("no such filesystem: {}", name);
                }
            }
            _ => machine::println!("usage: change filesystem <name>|directory <path>"),
        }
    }

    fn dispatch(session: &mut Session, line: &str) {
        let mut words: [&str; MAX_ARGS] = [""; MAX_ARGS];
        let n = tokenize(line, &mut words);
        if n == 0 {
            return;
        }
        let args = &words[1..n];

        match words[0] {
            "list" => cmd_list(session, args),
            "change" => cmd_change(session, args),
            "create" => cmd_create(args),
            "delete" => cmd_delete(args),
            "rename" => cmd_rename(args),
            "show" if args.first() == Some(&"diagnostics") => show_diagnostics(),
            "halt" => halt(),
            "reboot" => reboot(),
            other => machine::println!("unknown command: {}", other),
        }
    }

    fn show_diagnostics() {
        crate::memory_manager::MEMORY_MANAGER.lock(|mm| {
            machine::println!("frames: {}/{} used", mm.used_frames(), mm.total_frames());
        });

        let mut task_count = 0;
        crate::task::scheduler::TASKS.lock(|tasks| {
            tasks.visit_tasks(|_| {
                task_count += 1;
                crate::task::Visit::Next
            });
        });
        machine::println!("tasks: {}", task_count);

        for (label, kind) in [
            ("hw rngs", crate::registry::EntityType::HwRng),
            ("sw rngs", crate::registry::EntityType::SwRng),
            ("block devices", crate::registry::EntityType::BlockDevice),
            ("filesystems", crate::registry::EntityType::Filesystem),
        ] {
            let count = crate::registry::registry().lock(|r| r.find_entities_by_type(kind).count());
            machine::println!("{}: {}", label, count);
        }
    }

    fn halt() -> ! {
        let gpio = machine::platform::drivers::gpio();
        match machine::platform::drivers::power().off(gpio) {
            Ok(()) => unreachable!("Power::off never returns on success either"),
            Err(_) => machine::cpu::endless_sleep(),
        }
    }

    fn reboot() -> ! {
        machine::platform::drivers::power().reset()
    }

    /// The CLI task's entry point, as required by
    /// [`crate::task::scheduler::TaskTable::fork_kernel_task`]: `extern "C" fn(u64) -> !`.
    pub extern "C" fn task_entry(_arg: u64) -> ! {
        let mut session = Session::new();
        session.set_path("/");

        loop {
            machine::print!("\n$ ");
            let mut line = [0u8; MAX_LINE_LENGTH];
            let n = getline(&mut line, b'\n');
            if let Ok(text) = core::str::from_utf8(&line[..n]) {
                dispatch(&mut session, text);
            }
        }
    }
}

#[cfg(target_arch = "aarch64")]
pub use live::task_entry;
