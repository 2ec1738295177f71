//! Cached state of one `net.barman.Technology` object.

use serde::{Deserialize, Serialize};

use crate::Result;
use crate::api::models::{BarmanError, TechnologyState, TechnologyType};
use crate::core::directory::EntryToken;
use crate::core::value::{PropertyValue, TechnologyProperty};

/// Local mirror of one remote technology.
///
/// `Type` and `State` may arrive in any order. The entry only reports its
/// state once both have been seen, so a state is never attributed to the
/// wrong kind of technology.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyEntry {
    path: String,
    token: EntryToken,
    ready: bool,
    technology_type: Option<TechnologyType>,
    state: Option<TechnologyState>,
}

impl TechnologyEntry {
    pub(crate) fn new(path: impl Into<String>, token: EntryToken) -> Self {
        Self {
            path: path.into(),
            token,
            ready: false,
            technology_type: None,
            state: None,
        }
    }

    pub(crate) fn apply(&mut self, property: TechnologyProperty, value: &PropertyValue) -> Result<()> {
        let s = value.as_str().ok_or(BarmanError::UnexpectedType {
            property: property.as_str(),
            expected: "string",
        })?;

        match property {
            TechnologyProperty::Type => self.technology_type = Some(TechnologyType::from_remote(s)),
            TechnologyProperty::State => self.state = Some(TechnologyState::from_remote(s)),
        }
        Ok(())
    }

    pub(crate) fn mark_ready(&mut self) -> bool {
        !std::mem::replace(&mut self.ready, true)
    }

    /// Forces the state to unavailable ahead of removal.
    pub(crate) fn make_unavailable(&mut self) {
        self.state = Some(TechnologyState::Unavailable);
    }

    /// The `(kind, state)` pair to report, once both are known and the kind
    /// is one the directory tracks.
    pub(crate) fn reportable(&self) -> Option<(TechnologyType, TechnologyState)> {
        match (self.technology_type?, self.state?) {
            (TechnologyType::Unknown, _) | (_, TechnologyState::Unknown) => None,
            pair => Some(pair),
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn token(&self) -> EntryToken {
        self.token
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// The technology kind, [`TechnologyType::Unknown`] until reported.
    pub fn technology_type(&self) -> TechnologyType {
        self.technology_type.unwrap_or_default()
    }

    /// The technology state, [`TechnologyState::Unknown`] until reported.
    pub fn state(&self) -> TechnologyState {
        self.state.unwrap_or_default()
    }
}
