//! Error types and the error aggregator used by the coordinators.
//!
//! Every terminal error delivered downstream is a [`MaybeError`]. Causes
//! coming from sources are wrapped as-is; the coordinators only add the
//! variants describing structural problems (missing sources, empty input,
//! timeouts) and the [`CompositeError`] produced in delay-errors mode.

use std::{error::Error as StdError, fmt, sync::Arc};

use parking_lot::Mutex;
use smallvec::SmallVec;
use thiserror::Error;

/// The error channel of every Maybe and Flow source.
#[derive(Debug, Clone, Error)]
pub enum MaybeError {
  /// The wrapped computation failed.
  #[error(transparent)]
  Source(Arc<dyn StdError + Send + Sync>),

  /// A source failed with a plain message.
  #[error("{0}")]
  Message(String),

  /// Two or more causes, ordered by occurrence.
  #[error(transparent)]
  Composite(CompositeError),

  /// A source was required at `index` but none was supplied.
  #[error("the source at index {index} is missing")]
  MissingSource { index: usize },

  /// The operation needs at least one value or source and got none.
  #[error("index out of range: {0}")]
  OutOfRange(&'static str),

  /// Raised by `timeout` when no fallback is configured.
  #[error("the source did not signal within the allotted time")]
  Timeout,
}

impl MaybeError {
  /// Wrap any error as a source error.
  pub fn new<E>(err: E) -> Self
  where
    E: StdError + Send + Sync + 'static,
  {
    MaybeError::Source(Arc::new(err))
  }

  /// Source error carrying only a message.
  pub fn msg(message: impl Into<String>) -> Self { MaybeError::Message(message.into()) }

  /// Merge `first` and `second` into one composite error.
  ///
  /// Nested composites are flattened so the cause list keeps occurrence
  /// order: every cause of `first` comes before every cause of `second`.
  pub fn composite(first: MaybeError, second: MaybeError) -> Self {
    let mut causes = Vec::new();
    first.flatten_into(&mut causes);
    second.flatten_into(&mut causes);
    MaybeError::Composite(CompositeError { causes })
  }

  /// Build the terminal error for a list of causes.
  ///
  /// A single cause is returned unchanged; `None` when `causes` is empty.
  pub fn from_causes(causes: impl IntoIterator<Item = MaybeError>) -> Option<Self> {
    let mut flat = Vec::new();
    for cause in causes {
      cause.flatten_into(&mut flat);
    }
    match flat.len() {
      0 => None,
      1 => flat.pop(),
      _ => Some(MaybeError::Composite(CompositeError { causes: flat })),
    }
  }

  fn flatten_into(self, out: &mut Vec<MaybeError>) {
    match self {
      MaybeError::Composite(c) => out.extend(c.causes),
      other => out.push(other),
    }
  }

  /// The individual causes: one entry unless this is a composite.
  pub fn causes(&self) -> &[MaybeError] {
    match self {
      MaybeError::Composite(c) => &c.causes,
      other => std::slice::from_ref(other),
    }
  }

  pub fn is_timeout(&self) -> bool { matches!(self, MaybeError::Timeout) }

  pub fn is_out_of_range(&self) -> bool { matches!(self, MaybeError::OutOfRange(_)) }

  pub fn is_composite(&self) -> bool { matches!(self, MaybeError::Composite(_)) }
}

/// Several causes merged into one error.
#[derive(Debug, Clone)]
pub struct CompositeError {
  causes: Vec<MaybeError>,
}

impl CompositeError {
  pub fn causes(&self) -> &[MaybeError] { &self.causes }

  pub fn len(&self) -> usize { self.causes.len() }

  pub fn is_empty(&self) -> bool { self.causes.is_empty() }
}

impl fmt::Display for CompositeError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} errors occurred:", self.causes.len())?;
    for (i, cause) in self.causes.iter().enumerate() {
      write!(f, " [{}] {}", i + 1, cause)?;
    }
    Ok(())
  }
}

impl StdError for CompositeError {}

// ============================================================================
// ErrorAggregator
// ============================================================================

/// Accumulates errors reported by concurrently running inner sources.
///
/// - `FirstWins` keeps only the first error (fail-fast mode); later errors are
///   rejected so the caller can log them as undeliverable.
/// - `CollectAll` appends every error and materialises them into one
///   composite once the coordinator is ready to terminate (delay-errors mode).
pub enum ErrorAggregator {
  FirstWins(Mutex<Option<MaybeError>>),
  CollectAll(Mutex<SmallVec<[MaybeError; 2]>>),
}

impl ErrorAggregator {
  pub fn new(delay_errors: bool) -> Self {
    if delay_errors {
      ErrorAggregator::CollectAll(Mutex::new(SmallVec::new()))
    } else {
      ErrorAggregator::FirstWins(Mutex::new(None))
    }
  }

  pub fn delays_errors(&self) -> bool { matches!(self, ErrorAggregator::CollectAll(_)) }

  /// Record `err`. Returns `false` when the error was rejected because a first
  /// error is already held.
  pub fn add(&self, err: MaybeError) -> bool {
    match self {
      ErrorAggregator::FirstWins(slot) => {
        let mut slot = slot.lock();
        if slot.is_some() {
          drop(slot);
          tracing::debug!(error = %err, "dropping error after the first one was recorded");
          false
        } else {
          *slot = Some(err);
          true
        }
      }
      ErrorAggregator::CollectAll(list) => {
        list.lock().push(err);
        true
      }
    }
  }

  pub fn has_error(&self) -> bool {
    match self {
      ErrorAggregator::FirstWins(slot) => slot.lock().is_some(),
      ErrorAggregator::CollectAll(list) => !list.lock().is_empty(),
    }
  }

  /// Remove everything recorded so far and merge it into the terminal error.
  pub fn take(&self) -> Option<MaybeError> {
    match self {
      ErrorAggregator::FirstWins(slot) => slot.lock().take(),
      ErrorAggregator::CollectAll(list) => {
        let causes = std::mem::take(&mut *list.lock());
        MaybeError::from_causes(causes)
      }
    }
  }
}
