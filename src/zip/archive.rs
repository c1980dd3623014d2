//! The archive session: every public operation on one archive path.
//!
//! Mutating operations never touch the archive in place. New content is
//! written into a temporary file next to it and renamed over the original
//! once complete; on any failure the temporary file is dropped (and
//! deleted) and the original stays as it was.
//!
//! Concurrent sessions on the same path are not coordinated; callers must
//! serialize them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{IoContext, Result, ZipError};
use crate::io::{self as zio, LocalFileReader, ReadAt, copy_range};

use super::extractor::ZipExtractor;
use super::header::{ArchiveState, CentralDirectory, EntryHeader, EntryResult, EntryStatus, Properties};
use super::hooks::{AddHook, ExtractHook, HookAction, NoHook};
use super::options::{AddOptions, ExtractOptions};
use super::parser::ZipParser;
use super::selector::{Rule, Selection, Selector};
use super::structures::ATTR_DIRECTORY;
use super::writer::EntryWriter;

/// A parsed archive: the open reader, its directory summary and entries.
type Directory = (ZipParser<LocalFileReader>, CentralDirectory, Vec<EntryHeader>);

/// Handle on a ZIP archive at a filesystem path.
///
/// Nothing is opened until an operation runs, and nothing is kept between
/// operations.
#[derive(Debug, Clone)]
pub struct ZipArchive {
    path: PathBuf,
}

impl ZipArchive {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create a new archive from files and directories.
    ///
    /// Directories are expanded depth-first. Fails if a non-empty file
    /// already exists at the archive path.
    pub fn create<P: AsRef<Path>>(&self, paths: &[P], options: &AddOptions) -> Result<Vec<EntryResult>> {
        self.create_with(paths, options, &mut NoHook)
    }

    pub fn create_with<P: AsRef<Path>>(
        &self,
        paths: &[P],
        options: &AddOptions,
        hook: &mut dyn AddHook,
    ) -> Result<Vec<EntryResult>> {
        if !self.is_blank()? {
            return Err(ZipError::parameter(format!(
                "archive '{}' already exists",
                self.path.display()
            )));
        }
        let members = collect_members(paths)?;

        let temp = self.temp_file()?;
        let mut writer = EntryWriter::new(temp.reopen().at(temp.path())?)?;
        let mut written = Vec::new();
        let results = self.write_members(&mut writer, temp.path(), members, options, hook, 0, &mut written)?;

        let cd_offset = writer.position();
        for header in &written {
            writer.write_central(header)?;
        }
        let comment = options.comment.clone().unwrap_or_default().into_bytes();
        writer.finish(written.len(), cd_offset, comment)?;

        zio::persist(temp, &self.path).at(&self.path)?;
        debug!(archive = %self.path.display(), entries = written.len(), "created archive");
        Ok(results)
    }

    /// Append files and directories to the archive, creating it if needed.
    ///
    /// Existing entries are copied byte for byte; only the new entries and
    /// the central directory are written fresh.
    pub fn add<P: AsRef<Path>>(&self, paths: &[P], options: &AddOptions) -> Result<Vec<EntryResult>> {
        self.add_with(paths, options, &mut NoHook)
    }

    pub fn add_with<P: AsRef<Path>>(
        &self,
        paths: &[P],
        options: &AddOptions,
        hook: &mut dyn AddHook,
    ) -> Result<Vec<EntryResult>> {
        if self.is_blank()? {
            return self.create_with(paths, options, hook);
        }

        let (parser, dir, mut entries) = self.read_directory()?;
        let members = collect_members(paths)?;

        let temp = self.temp_file()?;
        let mut writer = EntryWriter::new(temp.reopen().at(temp.path())?)?;
        writer.copy_raw(parser.reader(), 0, dir.offset)?;

        let first_index = entries.len();
        let mut written = Vec::new();
        let results = self.write_members(&mut writer, temp.path(), members, options, hook, first_index, &mut written)?;
        entries.extend(written);

        let cd_offset = writer.position();
        for header in &entries {
            writer.write_central(header)?;
        }
        let comment = match &options.comment {
            Some(c) => c.clone().into_bytes(),
            None => dir.comment,
        };
        writer.finish(entries.len(), cd_offset, comment)?;

        zio::persist(temp, &self.path).at(&self.path)?;
        debug!(archive = %self.path.display(), added = entries.len() - first_index, "appended entries");
        Ok(results)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_members(
        &self,
        writer: &mut EntryWriter,
        temp_path: &Path,
        members: Vec<PathBuf>,
        options: &AddOptions,
        hook: &mut dyn AddHook,
        first_index: usize,
        written: &mut Vec<EntryHeader>,
    ) -> Result<Vec<EntryResult>> {
        let excluded: HashSet<PathBuf> = [canonical_target(&self.path), canonical_target(temp_path)]
            .into_iter()
            .flatten()
            .collect();

        let mut results = Vec::with_capacity(members.len());
        for path in members {
            let mut header = EntryHeader {
                filename: path.clone(),
                ..Default::default()
            };

            let meta = match fs::metadata(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "cannot stat source");
                    header.status = EntryStatus::ReadError;
                    results.push(header.into());
                    continue;
                }
            };
            if meta.is_dir() {
                header.external = ATTR_DIRECTORY;
            }
            header.set_mtime(zio::modified_secs(&meta).unwrap_or(0));
            header.stored_filename = options.stored_name(&path);

            let is_self = fs::canonicalize(&path).is_ok_and(|p| excluded.contains(&p));
            if header.stored_filename.is_empty() || is_self {
                debug!(path = %path.display(), "filtered");
                header.status = EntryStatus::Filtered;
                results.push(header.into());
                continue;
            }

            let view = header.clone();
            if hook.pre_add(&view, &mut header.stored_filename) == HookAction::Skip {
                header.status = EntryStatus::Skipped;
                results.push(header.into());
                continue;
            }
            if header.stored_filename.trim_end_matches('/').is_empty() {
                header.status = EntryStatus::Filtered;
                results.push(header.into());
                continue;
            }

            let folder_suffix = usize::from(header.is_folder() && !header.stored_filename.ends_with('/'));
            if header.stored_filename.len() + folder_suffix > u16::MAX as usize {
                warn!(path = %path.display(), "stored filename too long");
                header.status = EntryStatus::FilenameTooLong;
                results.push(header.into());
                continue;
            }

            let mut header = writer.write(header, !options.no_compression)?;
            if header.is_ok() {
                header.index = Some(first_index + written.len());
                written.push(header.clone());
            }
            hook.post_add(&header);
            results.push(header.into());
        }
        Ok(results)
    }

    /// Extract the selected entries.
    pub fn extract(&self, options: &ExtractOptions) -> Result<Vec<EntryResult>> {
        self.extract_with(options, &mut NoHook)
    }

    pub fn extract_with(&self, options: &ExtractOptions, hook: &mut dyn ExtractHook) -> Result<Vec<EntryResult>> {
        let rule = options.selection.rule()?;
        if self.is_empty_file()? {
            return Ok(Vec::new());
        }
        let (parser, _dir, entries) = self.read_directory()?;

        let extractor = ZipExtractor::new(&parser, options);
        let mut selector = Selector::new(&rule);
        let mut results = Vec::new();
        for entry in entries {
            if !selector.matches(&entry) {
                continue;
            }
            results.push(extractor.extract(entry, hook)?.into());
        }
        Ok(results)
    }

    /// Remove the selected entries. Returns the removed headers.
    ///
    /// A selection is required. When nothing matches the archive file is
    /// not touched at all.
    pub fn delete(&self, selection: &Selection) -> Result<Vec<EntryHeader>> {
        let rule = selection.rule()?;
        if matches!(rule, Rule::All) {
            return Err(ZipError::parameter("delete needs a by_name, by_preg or by_index rule"));
        }
        if self.is_empty_file()? {
            return Ok(Vec::new());
        }
        let (parser, dir, entries) = self.read_directory()?;

        let mut selector = Selector::new(&rule);
        let (removed, kept): (Vec<_>, Vec<_>) = entries.into_iter().partition(|e| selector.matches(e));
        if removed.is_empty() {
            debug!(archive = %self.path.display(), "nothing to delete");
            return Ok(removed);
        }

        let temp = self.temp_file()?;
        let mut writer = EntryWriter::new(temp.reopen().at(temp.path())?)?;
        let mut survivors = Vec::with_capacity(kept.len());
        for (index, mut entry) in kept.into_iter().enumerate() {
            let span = parser.entry_span(&entry)?;
            let offset = writer.position();
            writer.copy_raw(parser.reader(), entry.offset, span)?;
            entry.offset = offset;
            entry.index = Some(index);
            survivors.push(entry);
        }

        let cd_offset = writer.position();
        for entry in &survivors {
            writer.write_central(entry)?;
        }
        writer.finish(survivors.len(), cd_offset, dir.comment)?;

        zio::persist(temp, &self.path).at(&self.path)?;
        debug!(archive = %self.path.display(), removed = removed.len(), "deleted entries");
        Ok(removed)
    }

    /// Append every entry of `other` to this archive.
    ///
    /// A missing `other` is a no-op; a missing `self` becomes a copy of
    /// `other`. Entries with the same name in both archives are all kept.
    pub fn merge(&self, other: impl AsRef<Path>) -> Result<()> {
        let other = ZipArchive::new(other.as_ref());
        if other.is_blank()? {
            return Ok(());
        }
        if self.is_blank()? {
            return self.duplicate(other.path());
        }

        let (parser_a, dir_a, entries_a) = self.read_directory()?;
        let (parser_b, dir_b, entries_b) = other.read_directory()?;

        let temp = self.temp_file()?;
        let mut writer = EntryWriter::new(temp.reopen().at(temp.path())?)?;
        writer.copy_raw(parser_a.reader(), 0, dir_a.offset)?;
        let shift = writer.position();
        writer.copy_raw(parser_b.reader(), 0, dir_b.offset)?;

        let cd_offset = writer.position();
        let mut count = 0;
        for mut entry in entries_a {
            entry.index = Some(count);
            writer.write_central(&entry)?;
            count += 1;
        }
        for mut entry in entries_b {
            entry.offset += shift;
            entry.index = Some(count);
            writer.write_central(&entry)?;
            count += 1;
        }

        let comment = match (dir_a.comment.is_empty(), dir_b.comment.is_empty()) {
            (false, false) => [dir_a.comment, b" ".to_vec(), dir_b.comment].concat(),
            (true, _) => dir_b.comment,
            (false, true) => dir_a.comment,
        };
        writer.finish(count, cd_offset, comment)?;

        zio::persist(temp, &self.path).at(&self.path)?;
        debug!(archive = %self.path.display(), other = %other.path.display(), entries = count, "merged archives");
        Ok(())
    }

    /// Replace this archive with a byte-for-byte copy of `source`.
    pub fn duplicate(&self, source: impl AsRef<Path>) -> Result<()> {
        let source = source.as_ref();
        if !source.exists() {
            return Err(ZipError::NotFound(source.to_path_buf()));
        }
        let reader = LocalFileReader::new(source).at(source)?;

        let mut temp = self.temp_file()?;
        copy_range(&reader, 0, reader.size(), temp.as_file_mut()).at(temp.path())?;
        temp.as_file().sync_all().at(temp.path())?;

        zio::persist(temp, &self.path).at(&self.path)?;
        debug!(archive = %self.path.display(), source = %source.display(), "duplicated archive");
        Ok(())
    }

    /// Headers of every entry, in central directory order.
    pub fn list(&self) -> Result<Vec<EntryHeader>> {
        if self.is_empty_file()? {
            return Ok(Vec::new());
        }
        let (_parser, _dir, entries) = self.read_directory()?;
        Ok(entries)
    }

    /// Entry count and comment. A missing archive is reported, not an error.
    pub fn properties(&self) -> Result<Properties> {
        if !self.path.exists() {
            return Ok(Properties {
                entries: 0,
                comment: String::new(),
                cd_size: 0,
                cd_offset: 0,
                state: ArchiveState::Missing,
            });
        }
        if self.is_empty_file()? {
            return Ok(Properties {
                entries: 0,
                comment: String::new(),
                cd_size: 0,
                cd_offset: 0,
                state: ArchiveState::Ok,
            });
        }
        let (_parser, dir, _entries) = self.read_directory()?;
        Ok(Properties {
            entries: dir.entries,
            comment: String::from_utf8_lossy(&dir.comment).into_owned(),
            cd_size: dir.size,
            cd_offset: dir.offset,
            state: ArchiveState::Ok,
        })
    }

    /// Open the archive and parse its central directory.
    ///
    /// Also checks that the first stored entry starts with a local header,
    /// so that damage at the front of the file is caught before anything
    /// is written.
    fn read_directory(&self) -> Result<Directory> {
        if !self.path.exists() {
            return Err(ZipError::NotFound(self.path.clone()));
        }
        let reader = LocalFileReader::new(&self.path).at(&self.path)?;
        let parser = ZipParser::new(reader);
        let (dir, entries) = parser.read_directory()?;

        if let Some(first) = entries.iter().min_by_key(|e| e.offset) {
            parser.read_local_header(first)?;
        }
        Ok((parser, dir, entries))
    }

    /// True when the archive is missing or has zero length.
    fn is_blank(&self) -> Result<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(true),
            Err(e) => Err(e).at(&self.path),
        }
    }

    /// True when the archive exists with zero length; `NotFound` when missing.
    fn is_empty_file(&self) -> Result<bool> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len() == 0),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(ZipError::NotFound(self.path.clone())),
            Err(e) => Err(e).at(&self.path),
        }
    }

    fn temp_file(&self) -> Result<NamedTempFile> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        tempfile::Builder::new()
            .prefix(".rezip-")
            .suffix(".tmp")
            .tempfile_in(dir)
            .at(dir)
    }
}

/// Expand the caller's paths into archive members, depth-first.
///
/// Every path must exist; directories contribute themselves followed by
/// their contents in name order.
fn collect_members<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<PathBuf>> {
    let mut members = Vec::new();
    let mut seen = HashSet::new();

    for root in paths.iter().map(AsRef::as_ref) {
        if fs::symlink_metadata(root).is_err() {
            return Err(ZipError::NotFound(root.to_path_buf()));
        }
        for entry in WalkDir::new(root).sort_by_file_name() {
            let path = match entry {
                Ok(entry) => entry.into_path(),
                Err(e) => {
                    // Keep the path so the failure is reported on the entry.
                    warn!(error = %e, "cannot walk directory");
                    match e.path() {
                        Some(p) => p.to_path_buf(),
                        None => continue,
                    }
                }
            };
            if seen.insert(path.clone()) {
                members.push(path);
            }
        }
    }
    Ok(members)
}

/// Canonical form of a path that may not exist yet.
fn canonical_target(path: &Path) -> Option<PathBuf> {
    if let Ok(p) = fs::canonicalize(path) {
        return Some(p);
    }
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    Some(fs::canonicalize(parent).ok()?.join(path.file_name()?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn members_are_depth_first_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(root.join("b")).unwrap();
        fs::write(root.join("a.txt"), b"a").unwrap();
        fs::write(root.join("b/c.txt"), b"c").unwrap();
        fs::write(root.join("d.txt"), b"d").unwrap();

        let members = collect_members(&[&root]).unwrap();
        let rel: Vec<_> = members
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_string_lossy().replace('\\', "/"))
            .collect();
        assert_eq!(rel, vec!["root", "root/a.txt", "root/b", "root/b/c.txt", "root/d.txt"]);
    }

    #[test]
    fn missing_member_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_members(&[dir.path().join("nope")]).unwrap_err();
        assert!(matches!(err, ZipError::NotFound(_)));
    }

    #[test]
    fn duplicate_members_are_collapsed() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("x.txt");
        fs::write(&file, b"x").unwrap();
        assert_eq!(collect_members(&[&file, &file]).unwrap().len(), 1);
    }

    #[test]
    fn canonical_target_of_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = canonical_target(&dir.path().join("new.zip")).unwrap();
        assert_eq!(target, fs::canonicalize(dir.path()).unwrap().join("new.zip"));
    }
}
