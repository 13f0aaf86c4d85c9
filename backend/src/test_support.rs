//! Test utilities for the tandem crate.
//!
//! Shared by unit tests in `src/` and integration tests in `tests/` (through
//! the `test-support` feature).

use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;

/// Clock whose reading only moves when a test advances it.
pub struct MutableClock(Mutex<DateTime<Utc>>);

impl MutableClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self(Mutex::new(now))
    }

    pub fn advance(&self, delta: TimeDelta) {
        *self.lock_clock() += delta;
    }

    pub fn advance_seconds(&self, seconds: i64) {
        self.advance(TimeDelta::seconds(seconds));
    }

    fn lock_clock(&self) -> MutexGuard<'_, DateTime<Utc>> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("clock mutex"),
        }
    }
}

impl Clock for MutableClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.lock_clock()
    }
}

pub mod openapi {
    //! Helpers for inspecting generated OpenAPI schemas.

    use utoipa::openapi::schema::{Object, Schema};
    use utoipa::openapi::{OpenApi, RefOr};

    /// Look up a component schema and require it to be an object.
    pub fn object_schema<'a>(doc: &'a OpenApi, name: &str) -> &'a Object {
        let schema = doc
            .components
            .as_ref()
            .and_then(|components| components.schemas.get(name));
        match schema {
            Some(RefOr::T(Schema::Object(object))) => object,
            Some(_) => panic!("schema {name} is not an inline object"),
            None => panic!("schema {name} missing from components"),
        }
    }

    /// Names of the object's properties.
    pub fn property_names(object: &Object) -> Vec<&str> {
        object.properties.keys().map(String::as_str).collect()
    }
}
