//! Transform dumps
//!
//! Debug aid that writes module bytes to disk as they move through the
//! transform chain. By default only the final bytes of each module are
//! written. With stage dumping on, the input and every stage whose SHA-256
//! differs from the previous stage are written too. With changed-only on,
//! modules the chain left untouched are not written at all. Write failures
//! are logged and never fail resolution.

use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::loader::name::ModuleName;
use crate::loader::transform::StageObserver;

/// Numbered sibling directories tried when the configured one exists
const MAX_DUMP_DIR_ATTEMPTS: usize = 10;

/// Writes transformed modules under a root directory
#[derive(Debug, Clone)]
pub struct TransformDump {
    root: PathBuf,
    stages: bool,
    changed_only: bool,
}

impl TransformDump {
    /// Prepare a fresh dump directory based on `requested`
    ///
    /// If `requested` exists, `requested1`..`requested10` are tried. Returns
    /// `None` when every candidate exists or the directory cannot be created.
    pub fn create<P: AsRef<Path>>(requested: P) -> Option<Self> {
        let requested = requested.as_ref();
        let mut candidate = requested.to_path_buf();
        let mut attempt = 1;
        while candidate.exists() && attempt <= MAX_DUMP_DIR_ATTEMPTS {
            candidate = PathBuf::from(format!("{}{}", requested.display(), attempt));
            attempt += 1;
        }

        if candidate.exists() {
            info!(
                "Transform dump enabled, but {} dump directories already exist; clean them and try again",
                MAX_DUMP_DIR_ATTEMPTS
            );
            return None;
        }

        if let Err(e) = fs::create_dir_all(&candidate) {
            warn!("Could not create transform dump directory {:?}: {}", candidate, e);
            return None;
        }

        warn!("Transform dump enabled, saving all modules to {:?}", candidate);
        Some(Self {
            root: candidate,
            stages: false,
            changed_only: false,
        })
    }

    /// Also write the input and every changed intermediate stage
    pub fn with_stages(mut self, enabled: bool) -> Self {
        self.stages = enabled;
        self
    }

    /// Skip modules the transform chain did not change
    pub fn with_changed_only(mut self, enabled: bool) -> Self {
        self.changed_only = enabled;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Observer that records one module's transformation
    ///
    /// `transformers` is the number of transformers about to run. Call
    /// [`DumpSession::finish`] with the final bytes.
    pub fn session<'a>(
        &'a self,
        module: &'a ModuleName,
        extension: &'a str,
        transformers: usize,
    ) -> DumpSession<'a> {
        DumpSession {
            dump: self,
            module,
            extension,
            transformers,
            input_digest: None,
            last_digest: None,
        }
    }

    fn save(&self, relative: &str, bytes: &[u8]) {
        let out = self.root.join(relative);
        if let Some(parent) = out.parent() {
            if let Err(e) = fs::create_dir_all(parent) {
                warn!("Could not create dump directory {:?}: {}", parent, e);
                return;
            }
        }
        debug!("Saving transformed module to {:?}", out);
        if let Err(e) = fs::write(&out, bytes) {
            warn!("Could not save transformed module {:?}: {}", out, e);
        }
    }
}

/// Stage observer for a single module
pub struct DumpSession<'a> {
    dump: &'a TransformDump,
    module: &'a ModuleName,
    extension: &'a str,
    transformers: usize,
    input_digest: Option<[u8; 32]>,
    last_digest: Option<[u8; 32]>,
}

impl DumpSession<'_> {
    /// Write the final bytes
    pub fn finish(self, bytes: &[u8]) {
        if self.dump.changed_only {
            let digest: [u8; 32] = Sha256::digest(bytes).into();
            if self.input_digest == Some(digest) {
                debug!("Module {} unchanged by transformers, not saved", self.module);
                return;
            }
        }
        self.dump.save(&self.module.source_path(self.extension), bytes);
    }
}

impl StageObserver for DumpSession<'_> {
    fn observe(&mut self, stage: usize, transformer: Option<&str>, bytes: &[u8]) {
        let digest: [u8; 32] = Sha256::digest(bytes).into();
        if stage == 0 {
            self.input_digest = Some(digest);
        }
        if !self.dump.stages || self.last_digest == Some(digest) {
            return;
        }
        self.last_digest = Some(digest);

        let base = self.module.source_path(self.extension);
        let label = match transformer {
            None if self.dump.changed_only && self.transformers == 0 => return,
            None => format!("{}_{:03}_pretransform", base, stage),
            Some(name) => format!("{}_{:03}_{}", base, stage, sanitize(name)),
        };
        debug!(
            "Stage {} of {} has digest {}",
            stage,
            self.module,
            hex::encode(&digest[..8])
        );
        self.dump.save(&label, bytes);
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}
