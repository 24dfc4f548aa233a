//! Extension staging
//!
//! Setters called between traces stage key/value pairs here. The next trace
//! that is successfully enqueued takes the whole set and the map is cleared.
//! Setting a key twice before that keeps the last value.

use crate::error::{Result, TrackerError};
use crate::trace::event::{ExtensionValue, Extensions};
use crate::trace::validate::Validator;
use crate::trace::vocab::keys;

#[derive(Debug, Clone, Default)]
pub struct PendingExtensions {
    staged: Extensions,
}

impl PendingExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stages a generic extension after checking key and value
    pub fn set_var(
        &mut self,
        key: &str,
        value: impl Into<ExtensionValue>,
        validator: &Validator,
    ) -> Result<()> {
        let value = value.into();
        if !validator.check(
            !key.is_empty(),
            "Tracker: Extension key is null or empty. Ignoring extension.",
            || TrackerError::ExtensionKey,
        )? {
            return Ok(());
        }
        if !validator.check(
            value.is_present(),
            &format!("Tracker: Extension '{}' has an empty value. Ignoring.", key),
            || TrackerError::ExtensionValue {
                key: key.to_string(),
                reason: "value can't be empty or NaN".to_string(),
            },
        )? {
            return Ok(());
        }
        self.staged.insert(key, value);
        Ok(())
    }

    pub fn set_success(&mut self, success: bool) {
        self.staged.insert(keys::SUCCESS, success);
    }

    pub fn set_completion(&mut self, completion: bool) {
        self.staged.insert(keys::COMPLETION, completion);
    }

    pub fn set_response(&mut self, response: &str, validator: &Validator) -> Result<()> {
        if validator.require_text(response, keys::RESPONSE)? {
            self.staged.insert(keys::RESPONSE, response);
        }
        Ok(())
    }

    pub fn set_score(&mut self, score: f32, validator: &Validator) -> Result<()> {
        self.set_unit(keys::SCORE, score, validator)
    }

    pub fn set_progress(&mut self, progress: f32, validator: &Validator) -> Result<()> {
        self.set_unit(keys::PROGRESS, progress, validator)
    }

    pub fn set_health(&mut self, health: f32, validator: &Validator) -> Result<()> {
        if validator.require_number(health, keys::HEALTH)? {
            self.staged.insert(keys::HEALTH, health);
        }
        Ok(())
    }

    /// Stages `{"x": x, "y": y, "z": z}` as a string value
    pub fn set_position(&mut self, x: f32, y: f32, z: f32, validator: &Validator) -> Result<()> {
        let valid = !(x.is_nan() || y.is_nan() || z.is_nan());
        if validator.check(
            valid,
            "Tracker: Position coordinates can't be NaN, ignoring.",
            || TrackerError::ExtensionValue {
                key: keys::POSITION.to_string(),
                reason: "coordinates can't be NaN".to_string(),
            },
        )? {
            self.staged.insert(
                keys::POSITION,
                format!("{{\"x\":{}, \"y\": {}, \"z\": {}}}", x, y, z),
            );
        }
        Ok(())
    }

    fn set_unit(&mut self, key: &str, value: f32, validator: &Validator) -> Result<()> {
        if validator.require_number(value, key)? {
            validator.warn_unit_range(value, key);
            self.staged.insert(key, value);
        }
        Ok(())
    }

    pub fn staged(&self) -> &Extensions {
        &self.staged
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    pub fn clear(&mut self) {
        self.staged.clear();
    }
}
