//! Page sessions and fetch outcomes
//!
//! A session is one live browsing context against the target site. It is owned
//! by exactly one worker, recreated from scratch after any retryable failure and
//! never repaired in place.

use thiserror::Error;

/// Classified failure of a fetch or extraction
///
/// Workers branch on the variant: retryable failures recreate the session and
/// retry, structural failures skip the task, fatal failures mean no session can
/// be built at all.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transient failure: {reason}")]
    Retryable { reason: String },

    #[error("missing content: {reason}")]
    Structural { reason: String },

    #[error("session unavailable: {reason}")]
    Fatal { reason: String },
}

impl FetchError {
    pub fn retryable(reason: impl Into<String>) -> Self {
        Self::Retryable {
            reason: reason.into(),
        }
    }

    pub fn structural(reason: impl Into<String>) -> Self {
        Self::Structural {
            reason: reason.into(),
        }
    }

    pub fn fatal(reason: impl Into<String>) -> Self {
        Self::Fatal {
            reason: reason.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Retryable { .. })
    }
}

/// A fetched page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    /// Final URL after redirects
    pub url: String,

    /// HTTP status code
    pub status: u16,

    /// Document body
    pub body: String,
}

/// State every fresh session must re-establish before use
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Game server selection ("global" or "japan")
    pub server: String,

    /// Preferred content language
    pub locale: String,

    /// Page visited once to pick up site state (cookies, redirects)
    pub home_url: Option<String>,
}

/// One live browsing context
///
/// Not safe for concurrent use; a session never leaves the worker that created it.
pub trait Session {
    /// Opens `target` and returns its content
    fn open(&mut self, target: &str) -> Result<Page, FetchError>;

    /// Re-establishes locale and server selection
    fn reset_state(&mut self, options: &SessionOptions) -> Result<(), FetchError>;

    /// Releases the session
    fn close(&mut self);
}

/// Builds sessions; shared by every worker thread
pub trait SessionFactory: Sync {
    type Session: Session;

    /// Creates a fresh session, or `Fatal` if none can be built
    fn create(&self) -> Result<Self::Session, FetchError>;
}

/// Replaceable slot holding a worker's current session
///
/// The session is created lazily on first use and closed when the slot is dropped.
pub struct SessionSlot<'a, F: SessionFactory> {
    factory: &'a F,
    options: &'a SessionOptions,
    session: Option<F::Session>,
    created: u32,
}

impl<'a, F: SessionFactory> SessionSlot<'a, F> {
    pub fn new(factory: &'a F, options: &'a SessionOptions) -> Self {
        Self {
            factory,
            options,
            session: None,
            created: 0,
        }
    }

    /// Returns the current session, creating one if the slot is empty
    pub fn get(&mut self) -> Result<&mut F::Session, FetchError> {
        if self.session.is_none() {
            self.establish()?;
        }
        self.session
            .as_mut()
            .ok_or_else(|| FetchError::fatal("session slot empty after creation"))
    }

    /// Destroys the current session and builds a fresh one
    pub fn recreate(&mut self) -> Result<(), FetchError> {
        self.destroy();
        self.establish()
    }

    /// Closes and drops the current session, if any
    pub fn destroy(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
    }

    /// Whether the slot currently holds a live session
    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Number of sessions the factory produced for this slot
    ///
    /// Counts sessions whose state reset later failed; only a refusing factory
    /// leaves this at zero.
    pub fn created(&self) -> u32 {
        self.created
    }

    fn establish(&mut self) -> Result<(), FetchError> {
        let mut session = self.factory.create()?;
        self.created += 1;
        if let Err(e) = session.reset_state(self.options) {
            session.close();
            return Err(e);
        }
        self.session = Some(session);
        Ok(())
    }
}

impl<F: SessionFactory> Drop for SessionSlot<'_, F> {
    fn drop(&mut self) {
        self.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::testing::{ScriptedFactory, SessionScript};

    #[test]
    fn test_fetch_error_classification() {
        assert!(FetchError::retryable("timeout").is_retryable());
        assert!(!FetchError::structural("no name").is_retryable());
        assert!(!FetchError::fatal("no browser").is_retryable());
    }

    #[test]
    fn test_slot_creates_lazily() {
        let factory = ScriptedFactory::new(SessionScript::default());
        let options = SessionOptions::default();
        let mut slot = SessionSlot::new(&factory, &options);

        assert_eq!(factory.creates(), 0);
        slot.get().unwrap();
        slot.get().unwrap();
        assert_eq!(factory.creates(), 1);
        assert_eq!(factory.resets(), 1);
        assert_eq!(slot.created(), 1);
    }

    #[test]
    fn test_slot_recreate_closes_previous() {
        let factory = ScriptedFactory::new(SessionScript::default());
        let options = SessionOptions::default();
        let mut slot = SessionSlot::new(&factory, &options);

        slot.get().unwrap();
        slot.recreate().unwrap();
        assert_eq!(factory.creates(), 2);
        assert_eq!(factory.closes(), 1);

        drop(slot);
        assert_eq!(factory.closes(), 2);
    }

    #[test]
    fn test_slot_reports_factory_failure() {
        let factory = ScriptedFactory::new(SessionScript {
            refuse_create: true,
            ..SessionScript::default()
        });
        let options = SessionOptions::default();
        let mut slot = SessionSlot::new(&factory, &options);

        assert!(matches!(slot.get(), Err(FetchError::Fatal { .. })));
        assert_eq!(slot.created(), 0);
        assert!(!slot.is_active());
    }

    #[test]
    fn test_slot_counts_session_whose_reset_failed() {
        let factory = ScriptedFactory::new(SessionScript {
            fail_reset: 1,
            ..SessionScript::default()
        });
        let options = SessionOptions::default();
        let mut slot = SessionSlot::new(&factory, &options);

        assert!(slot.get().unwrap_err().is_retryable());
        assert_eq!(slot.created(), 1);
        assert!(!slot.is_active());
        assert_eq!(factory.closes(), 1);

        slot.get().unwrap();
        assert_eq!(slot.created(), 2);
        assert!(slot.is_active());
    }
}
