//! Cache entry validation by replay.
//!
//! A candidate entry from the previous build is reusable only if replaying
//! its recorded observations, in order, against today's virtual file
//! system produces the same answers. Replay is hypothetical: nothing
//! executes, but the files the candidate tree would create are overlaid
//! (see [`HypoFiles`]) so that probes which came after a child operation
//! see its output, just as they did when the entry was recorded. The first
//! diverging observation ends the replay.

use kiln_cache::{CacheEntry, FileFact, OpKind, Step};

use crate::hypo::HypoFiles;
use crate::session::Session;

/// Replays candidate entries against the current session.
pub(crate) struct Validator<'s> {
    session: &'s Session,
    hypo: HypoFiles,
}

impl<'s> Validator<'s> {
    pub fn new(session: &'s Session) -> Self {
        Self {
            session,
            hypo: HypoFiles::default(),
        }
    }

    /// Decides whether a candidate `BuildFile` entry can be reused for a
    /// call with the same function name, arguments and output path.
    ///
    /// Beyond replaying the observation list, the candidate's recorded
    /// output observation must still match the file on disk: the file is
    /// the cached artifact, and if it changed or vanished the entry is
    /// worthless regardless of its inputs.
    pub fn can_reuse_file(&mut self, candidate: &CacheEntry) -> bool {
        if candidate.failed || candidate.setup_failed {
            return false;
        }
        if !self.session.version_unchanged(&candidate.func) {
            return false;
        }
        if !self.output_still_matches(candidate) {
            return false;
        }
        // The caller already owns the output path and has prepared its
        // directories; only the recorded observations need replaying.
        self.validate_steps(candidate)
    }

    /// Decides whether a candidate `Subbuild` entry can be reused.
    pub fn can_reuse_subbuild(&mut self, candidate: &CacheEntry) -> bool {
        if candidate.failed || candidate.setup_failed {
            return false;
        }
        if !self.session.version_unchanged(&candidate.func) {
            return false;
        }
        self.validate_steps(candidate)
    }

    /// Validates a nested `BuildFile` entry during a parent's replay.
    fn validate_file_entry(&mut self, entry: &CacheEntry) -> bool {
        if entry.failed || entry.setup_failed {
            // A recorded failure, even one the parent caught, invalidates
            // the parent: the failure's conditions may no longer hold.
            return false;
        }
        if !self.session.version_unchanged(&entry.func) {
            return false;
        }
        if !self.output_still_matches(entry) {
            return false;
        }
        let Some(output) = &entry.output else {
            return false;
        };
        let path = &output.path;

        // A path this session already claimed cannot be produced again.
        {
            let st = self.session.state.lock().unwrap();
            if st.files.contains_key(path) {
                return false;
            }
        }
        if self.session.is_reserved_path(path) {
            return false;
        }
        let Some(parent) = kiln_fs::paths::parent(path) else {
            return false;
        };
        if self.session.dirs_to_make(parent, Some(&self.hypo)).is_err() {
            return false;
        }

        self.hypo.started_building(path);
        if !self.validate_steps(entry) {
            return false;
        }
        self.hypo.finished_building(path);
        true
    }

    /// Validates a nested `Subbuild` entry during a parent's replay.
    fn validate_subbuild_entry(&mut self, entry: &CacheEntry) -> bool {
        if entry.failed || entry.setup_failed {
            return false;
        }
        if !self.session.version_unchanged(&entry.func) {
            return false;
        }
        // Already executed (or claimed) this session: the parent would
        // collide if its replay were applied.
        {
            let op = entry.op_id(self.session.version_of(&entry.func));
            let st = self.session.state.lock().unwrap();
            if st.ops.contains_key(&op) {
                return false;
            }
        }
        self.validate_steps(entry)
    }

    /// Replays an entry's recorded steps in order.
    fn validate_steps(&mut self, entry: &CacheEntry) -> bool {
        for step in &entry.steps {
            let ok = match step {
                Step::Fact(fact) => self.validate_fact(fact),
                Step::Child(child) => match child.kind {
                    OpKind::BuildFile => self.validate_file_entry(child),
                    OpKind::Subbuild => self.validate_subbuild_entry(child),
                },
            };
            if !ok {
                return false;
            }
        }
        true
    }

    /// Re-performs one recorded observation and compares answers.
    fn validate_fact(&mut self, fact: &FileFact) -> bool {
        let session = self.session;
        let hypo = Some(&self.hypo);
        match fact {
            FileFact::IsFile { path, value } => session.virt_is_file(path, hypo) == *value,
            FileFact::IsDir { path, value } => session.virt_is_dir(path, hypo) == *value,
            FileFact::Exists { path, value } => session.virt_exists(path, hypo) == *value,
            FileFact::ListDir { path, outcome } => {
                let current = session.virt_list_dir(path, hypo);
                match (outcome, current) {
                    (Ok(recorded), Ok(names)) => *recorded == names,
                    (Err(kind), Err(failure)) => *kind == failure.kind,
                    _ => false,
                }
            }
            FileFact::Read {
                path,
                comparison,
                outcome,
            } => {
                let current = session.virt_read_observe(path, *comparison, hypo);
                match (outcome, current) {
                    (Ok(recorded), Ok(observation)) => *recorded == observation,
                    (Err(kind), Err(failure)) => *kind == failure.kind,
                    _ => false,
                }
            }
            FileFact::FileSize { path, outcome } => {
                let current = session.virt_file_size(path, hypo);
                match (outcome, current) {
                    (Ok(recorded), Ok(size)) => *recorded == size,
                    (Err(kind), Err(failure)) => *kind == failure.kind,
                    _ => false,
                }
            }
            FileFact::SymlinkTo { path, outcome } => {
                let current = session.virt_read_link(path);
                match (outcome, current) {
                    (Ok(recorded), Ok(target)) => *recorded == target,
                    (Err(kind), Err(failure)) => *kind == failure.kind,
                    _ => false,
                }
            }
            FileFact::WalkDir {
                path,
                subdirs,
                subfiles,
            } => {
                let (cur_dirs, cur_files) = session.walk_split(path, hypo);
                cur_dirs == *subdirs && cur_files == *subfiles
            }
        }
    }

    /// Checks the candidate's recorded output observation against the
    /// real file on disk, under the candidate's own comparison.
    fn output_still_matches(&self, entry: &CacheEntry) -> bool {
        let Some(output) = &entry.output else {
            return false;
        };
        let Some(recorded) = &output.observation else {
            return false;
        };
        if !self.session.probe.is_file(&output.path) {
            return false;
        }
        match kiln_fs::Observation::capture(
            self.session.probe.as_ref(),
            &output.path,
            output.comparison,
        ) {
            Ok(observation) => observation == *recorded,
            Err(_) => false,
        }
    }
}
