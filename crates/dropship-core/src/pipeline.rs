//! Per-file ingestion pipeline
//!
//! A run walks one incoming file through
//! `Arrived → RawPublishAttempted → Decrypting → Decrypted → Repairing →
//! Repaired → Extracting → Extracted → Publishing → Done`, or stops in
//! `Abandoned` when decryption, repair, extraction or publishing fails.
//!
//! Failure policy:
//! - raw publish is advisory; its failure is logged and the run continues
//! - decrypt failure: any partial decrypter output is removed
//! - repair failure: the decrypted archive is kept for inspection
//! - extract failure: the repaired archive is removed (or kept when
//!   `keep_failed_archives` is set); a partly written destination folder is
//!   left as is
//! - publish failure: the extracted folder is removed
//!
//! The incoming file is removed once the run reaches `Done` or `Abandoned`.

use crate::artifact::{self, Artifact};
use crate::config::PipelineConfig;
use crate::decrypt::Decrypt;
use crate::error::StageError;
use crate::extract::Extract;
use crate::model::{FileArrivalEvent, Stage};
use crate::publish::Publisher;
use crate::repair::Repair;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a run ended
#[derive(Debug)]
pub enum RunOutcome {
    Done,
    Abandoned { at: Stage, error: StageError },
}

/// Summary of one pipeline run. Only used for logging and by callers
/// embedding the pipeline; nothing is persisted.
#[derive(Debug)]
pub struct RunReport {
    pub file: PathBuf,
    /// Stages entered, in order, ending with `Done` or `Abandoned`
    pub stages: Vec<Stage>,
    /// Key of the raw upload, or why it failed
    pub raw_publish: Result<String, StageError>,
    /// Keys of extracted files uploaded
    pub published: Vec<String>,
    pub outcome: RunOutcome,
    /// Whether the incoming file is gone after cleanup
    pub incoming_removed: bool,
}

impl RunReport {
    pub fn is_done(&self) -> bool {
        matches!(self.outcome, RunOutcome::Done)
    }

    pub fn final_stage(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Arrived)
    }

    pub fn visited(&self, stage: Stage) -> bool {
        self.stages.contains(&stage)
    }
}

type Abandon = (Stage, StageError);

/// Stage bookkeeping for a single run
struct Run {
    stages: Vec<Stage>,
}

impl Run {
    fn new() -> Self {
        Self {
            stages: vec![Stage::Arrived],
        }
    }

    fn enter(&mut self, stage: Stage, file: &Path) {
        debug!("{}: {}", file.display(), stage);
        self.stages.push(stage);
    }

    fn current(&self) -> Stage {
        self.stages.last().copied().unwrap_or(Stage::Arrived)
    }
}

/// The ingestion pipeline. Stateless between runs; share it behind an `Arc`.
pub struct Pipeline {
    config: Arc<PipelineConfig>,
    decrypter: Arc<dyn Decrypt>,
    repairer: Arc<dyn Repair>,
    extractor: Arc<dyn Extract>,
    publisher: Publisher,
}

impl Pipeline {
    pub fn new(
        config: PipelineConfig,
        decrypter: Arc<dyn Decrypt>,
        repairer: Arc<dyn Repair>,
        extractor: Arc<dyn Extract>,
        publisher: Publisher,
    ) -> Self {
        Self {
            config: Arc::new(config),
            decrypter,
            repairer,
            extractor,
            publisher,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the full pipeline for one arrival. Never fails: stage errors are
    /// logged and reported in the returned [`RunReport`].
    pub async fn process(&self, event: FileArrivalEvent) -> RunReport {
        let file = event.path;
        info!("File added: {}", file.display());

        let mut run = Run::new();

        let raw_publish = self
            .publisher
            .publish_file(&self.config.raw_folder, &file)
            .await
            .map_err(StageError::RawPublish);
        if let Err(e) = &raw_publish {
            warn!("Raw upload of {} failed, continuing: {}", file.display(), e);
        }
        run.enter(Stage::RawPublishAttempted, &file);

        let result = self.transform(&file, &mut run).await;

        let (published, outcome) = match result {
            Ok(keys) => {
                run.enter(Stage::Done, &file);
                info!(
                    "Processed {}: {} file(s) published to {}/{}",
                    file.display(),
                    keys.len(),
                    self.publisher.bucket(),
                    self.config.extracted_folder
                );
                (keys, RunOutcome::Done)
            }
            Err((at, error)) => {
                run.enter(Stage::Abandoned, &file);
                error!("Abandoned {} while {}: {}", file.display(), at, error);
                (Vec::new(), RunOutcome::Abandoned { at, error })
            }
        };

        let incoming_removed = artifact::remove_file(&file);

        RunReport {
            file,
            stages: run.stages,
            raw_publish,
            published,
            outcome,
            incoming_removed,
        }
    }

    /// Decrypt, repair, extract and publish. Intermediate artifacts are owned
    /// by guards and released on every exit path unless retained.
    async fn transform(&self, incoming: &Path, run: &mut Run) -> Result<Vec<String>, Abandon> {
        run.enter(Stage::Decrypting, incoming);
        let planned = self
            .decrypter
            .output_path(incoming)
            .map_err(|e| (run.current(), StageError::Decrypt(e)))?;
        let mut decrypted = Artifact::planned(planned);

        let path = self
            .decrypter
            .decrypt(&self.config.decryption_key, incoming)
            .await
            .map_err(|e| (run.current(), StageError::Decrypt(e)))?;
        decrypted.adopt(path);
        run.enter(Stage::Decrypted, incoming);

        run.enter(Stage::Repairing, incoming);
        let planned = self
            .repairer
            .output_path(decrypted.path())
            .map_err(|e| (run.current(), StageError::Repair(e)))?;
        let mut repaired = Artifact::planned(planned);

        match self.repairer.repair(decrypted.path()).await {
            Ok(path) => repaired.adopt(path),
            Err(e) => {
                let kept = decrypted.retain();
                warn!("Keeping {} for inspection", kept.display());
                return Err((run.current(), StageError::Repair(e)));
            }
        }
        run.enter(Stage::Repaired, incoming);

        run.enter(Stage::Extracting, incoming);
        let folder = match self.extractor.extract(repaired.path()).await {
            Ok(folder) => Artifact::dir(folder),
            Err(e) => {
                if self.config.keep_failed_archives {
                    let kept = repaired.retain();
                    warn!("Keeping {} after failed extraction", kept.display());
                } else {
                    repaired.release();
                }
                return Err((run.current(), StageError::Extract(e)));
            }
        };
        repaired.release();
        run.enter(Stage::Extracted, incoming);

        run.enter(Stage::Publishing, incoming);
        let keys = self
            .publisher
            .publish_folder(&self.config.extracted_folder, folder.path())
            .await
            .map_err(|e| (run.current(), StageError::Publish(e)))?;

        folder.release();
        decrypted.release();
        Ok(keys)
    }
}
