//! Caller hooks around each entry of an `add` or `extract` batch.
//!
//! A hook sees an immutable copy of the entry and may change exactly one
//! field: the stored name when adding, the target path when extracting.

use std::path::PathBuf;

use super::header::EntryHeader;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HookAction {
    #[default]
    Continue,
    /// Leave this entry out; it is reported with status `skipped`.
    Skip,
}

pub trait AddHook {
    fn pre_add(&mut self, _entry: &EntryHeader, _stored_filename: &mut String) -> HookAction {
        HookAction::Continue
    }

    fn post_add(&mut self, _entry: &EntryHeader) {}
}

pub trait ExtractHook {
    fn pre_extract(&mut self, _entry: &EntryHeader, _filename: &mut PathBuf) -> HookAction {
        HookAction::Continue
    }

    fn post_extract(&mut self, _entry: &EntryHeader) {}
}

/// Hook that does nothing; used by the plain `add`/`extract` calls.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHook;

impl AddHook for NoHook {}

impl ExtractHook for NoHook {}
