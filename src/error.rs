use std::collections::BTreeMap;

use thiserror::Error;

use crate::particle::NodeId;
use crate::writer::WriteError;

/// Setup and I/O errors
#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Unknown particle '{0}'")]
    UnknownParticle(String),
    #[error("Invalid decay descriptor '{descriptor}': {reason}")]
    Descriptor { descriptor: String, reason: String },
    #[error("Invalid decay tree: {0}")]
    Tree(String),
    #[error("Invalid histogram: {0}")]
    Histogram(String),
    #[error("Unknown kinematic parameter '{0}'")]
    UnknownParameter(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Failed to write event: {0}")]
    Write(#[from] WriteError),
    #[error("External decay generator failed: {0}")]
    External(String),
}

/// Reasons why a single event could not be generated
///
/// None of these are fatal: the caller simply moves on to the next event.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error(
        "Decay of node {node} is kinematically forbidden: \
         mass {parent_mass} < sum of daughter masses {daughter_mass_sum}"
    )]
    KinematicallyForbidden {
        node: NodeId,
        parent_mass: f64,
        daughter_mass_sum: f64,
    },
    #[error("Phase space generation for node {node} failed after {attempts} attempts")]
    PhaseSpaceExhausted { node: NodeId, attempts: usize },
    #[error("Accept/reject failed after {attempts} attempts")]
    AcceptRejectExhausted { attempts: usize },
    #[error("Cannot decay node {node}: {reason}")]
    InvalidDecay { node: NodeId, reason: String },
    #[error("External decay generator failed: {0}")]
    External(String),
}

impl EventError {
    /// Short identifier used to group repeated failures
    pub fn kind(&self) -> FailureKind {
        match self {
            EventError::KinematicallyForbidden { .. } => FailureKind::KinematicallyForbidden,
            EventError::PhaseSpaceExhausted { .. } => FailureKind::PhaseSpaceExhausted,
            EventError::AcceptRejectExhausted { .. } => FailureKind::AcceptRejectExhausted,
            EventError::InvalidDecay { .. } => FailureKind::InvalidDecay,
            EventError::External(_) => FailureKind::External,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FailureKind {
    KinematicallyForbidden,
    PhaseSpaceExhausted,
    AcceptRejectExhausted,
    InvalidDecay,
    External,
}

/// Counts per-event failures and reports each kind loudly only once
#[derive(Debug, Clone, Default)]
pub struct FailureLog {
    counts: BTreeMap<FailureKind, usize>,
}

impl FailureLog {
    pub fn record(&mut self, err: &EventError) {
        let count = self.counts.entry(err.kind()).or_insert(0);
        *count += 1;
        if *count == 1 {
            tracing::warn!("{err} (further occurrences are only counted)");
        } else {
            tracing::trace!("{err}");
        }
    }

    pub fn counts(&self) -> &BTreeMap<FailureKind, usize> {
        &self.counts
    }

    pub fn count(&self, kind: FailureKind) -> usize {
        self.counts.get(&kind).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}
