//! Sequential gatherer pipeline.
//!
//! Stages run in the order they were added. Each one sees the model as left
//! by all earlier stages; its delta is merged and its issues appended before
//! the next stage starts. Issues never stop the run. A gatherer error or a
//! merge conflict does.

use crate::error::{Result, SariError};
use crate::gather::{Capability, GatherContext, Gatherer};
use crate::issue::Issue;
use crate::model::{Model, Tree};
use crate::pool::WorkerPool;
use chrono::{DateTime, Utc};
use std::collections::HashSet;

/// Outcome of a complete run.
#[derive(Debug)]
pub struct Report {
    pub model: Model,
    pub issues: Vec<Issue>,
}

pub struct Pipeline {
    seed: Tree,
    stages: Vec<Box<dyn Gatherer>>,
    pool: WorkerPool,
    now: DateTime<Utc>,
}

impl Pipeline {
    pub fn new(seed: Tree, pool: WorkerPool) -> Self {
        Self {
            seed,
            stages: Vec::new(),
            pool,
            now: Utc::now(),
        }
    }

    /// Evaluate grant windows against `now` instead of the wall clock.
    pub fn at(mut self, now: DateTime<Utc>) -> Self {
        self.now = now;
        self
    }

    pub fn stage(mut self, gatherer: impl Gatherer + 'static) -> Self {
        self.stages.push(Box::new(gatherer));
        self
    }

    pub fn add(&mut self, gatherer: Box<dyn Gatherer>) {
        self.stages.push(gatherer);
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|g| g.name()).collect()
    }

    /// Check that every stage's requirements are produced by an earlier one.
    pub fn validate(&self) -> Result<()> {
        let mut available: HashSet<Capability> = HashSet::new();
        for stage in &self.stages {
            if let Some(missing) = stage.requires().iter().find(|c| !available.contains(*c)) {
                return Err(SariError::StageOrder {
                    stage: stage.name().to_string(),
                    missing: missing.to_string(),
                });
            }
            available.extend(stage.produces().iter().copied());
        }
        Ok(())
    }

    /// Run every stage, then shut the worker pool down.
    pub fn run(self) -> Result<Report> {
        self.validate()?;
        let Pipeline {
            seed,
            stages,
            pool,
            now,
        } = self;

        let result = run_stages(seed, &stages, &pool, now);
        pool.shutdown();
        result
    }
}

fn run_stages(
    seed: Tree,
    stages: &[Box<dyn Gatherer>],
    pool: &WorkerPool,
    now: DateTime<Utc>,
) -> Result<Report> {
    let ctx = GatherContext { pool, now };
    let mut model = Model::new(seed);
    let mut issues = Vec::new();
    for stage in stages {
        tracing::debug!(stage = stage.name(), "gathering");
        let gathered = stage.gather(&model, &ctx)?;
        tracing::debug!(
            stage = stage.name(),
            issues = gathered.issues.len(),
            "merging"
        );
        issues.extend(gathered.issues);
        model.merge(gathered.delta)?;
    }
    Ok(Report { model, issues })
}
