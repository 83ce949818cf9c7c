//! Walks a directory tree and compares plain `String` storage of path components with
//! interned storage.
//!
//! Usage: `dedup-walk [--json] [DIR]`

use ::std::{env, path::Path, process::ExitCode};

use ::stringdedup::{DedupStr, Pool, Statistics};
use ::walkdir::{DirEntry, WalkDir};

#[cfg(windows)]
const DEFAULT_ROOT: &str = r"C:\Windows";
#[cfg(not(windows))]
const DEFAULT_ROOT: &str = "/usr";

/// (folder, basename, extension)
type Triple<S> = (S, S, S);

fn split(path: &Path) -> Triple<&str> {
    let folder = path.parent().and_then(Path::to_str).unwrap_or_default();
    let basename = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let extension = path.extension().and_then(|s| s.to_str()).unwrap_or_default();
    (folder, basename, extension)
}

/// Non-directory entries under `root`, counting unreadable ones in `skipped`
fn files<'a>(root: &str, skipped: &'a mut usize) -> impl Iterator<Item = DirEntry> + 'a {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(move |entry| match entry {
            Ok(entry) => Some(entry),
            Err(_) => {
                *skipped += 1;
                None
            }
        })
        .filter(|entry| !entry.file_type().is_dir())
}

fn report(label: &str, stats: &Statistics, size: u64, bytes: u64, json: bool) {
    if json {
        match serde_json::to_string(stats) {
            Ok(s) => println!("{{\"phase\":\"{label}\",\"size\":{size},\"bytes\":{bytes},\"statistics\":{s}}}"),
            Err(e) => eprintln!("failed to encode statistics: {e}"),
        }
    } else {
        println!("[{label}] pool size: {size} entries, {bytes} bytes");
        println!("[{label}] {stats}");
    }
}

fn main() -> ExitCode {
    let mut json = false;
    let mut root = None;
    for arg in env::args().skip(1) {
        match arg.as_str() {
            "--json" => json = true,
            "-h" | "--help" => {
                println!("usage: dedup-walk [--json] [DIR]  (default: {DEFAULT_ROOT})");
                return ExitCode::SUCCESS;
            }
            _ => root = Some(arg),
        }
    }
    let root = root.unwrap_or_else(|| DEFAULT_ROOT.to_owned());

    let pool = Pool::new_hash64();
    let mut plain: Vec<Triple<String>> = Vec::new();
    let mut interned: Vec<Triple<DedupStr>> = Vec::new();
    let mut skipped = 0usize;

    for entry in files(&root, &mut skipped) {
        let (folder, basename, extension) = split(entry.path());
        plain.push((folder.to_owned(), basename.to_owned(), extension.to_owned()));
        interned.push((
            pool.intern_str(folder),
            pool.intern_str(basename),
            pool.intern_str(extension),
        ));
    }

    if plain.is_empty() {
        eprintln!("no entries found under {root}");
        return ExitCode::FAILURE;
    }

    let plain_bytes: usize = plain.iter().map(|(f, b, e)| f.len() + b.len() + e.len()).sum();
    if !json {
        println!("walked {root}: {} entries ({skipped} unreadable)", plain.len());
        println!("plain strings: {plain_bytes} bytes of content");
    }
    report("loaded", &pool.statistics(), pool.size(), pool.byte_count(), json);

    drop(plain);
    drop(interned);
    report("released", &pool.statistics(), pool.size(), pool.byte_count(), json);

    ExitCode::SUCCESS
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_files_skips_directories() {
        let root = env::temp_dir().join(format!("dedup-walk-{}", std::process::id()));
        fs::create_dir_all(root.join("nested/deeper")).unwrap();
        fs::write(root.join("top.txt"), b"a").unwrap();
        fs::write(root.join("nested/inner.rs"), b"b").unwrap();

        let mut skipped = 0;
        let mut names: Vec<_> = files(root.to_str().unwrap(), &mut skipped)
            .map(|entry| entry.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        fs::remove_dir_all(&root).unwrap();

        assert_eq!(names, ["inner.rs", "top.txt"]);
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_split_components() {
        assert_eq!(split(Path::new("usr/lib/libc.so")), ("usr/lib", "libc", "so"));
        assert_eq!(split(Path::new("README")), ("", "README", ""));
    }
}
