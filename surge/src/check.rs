use crate::http::Response;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use surge_core::CheckCondition;

type Predicate = Arc<dyn Fn(&Response) -> bool + Send + Sync>;

/// A named boolean assertion over the last response of an iteration.
///
/// # Example
/// ```
/// use std::time::Duration;
/// use surge::{Check, Response};
///
/// let check = Check::status(200).and(Check::duration_below(Duration::from_millis(50)));
/// assert_eq!(check.name(), "status is 200");
/// assert!(check.evaluate(&Response::new(200)));
/// ```
#[derive(Clone)]
pub struct Check {
    name: Arc<str>,
    predicate: Predicate,
}

impl Check {
    pub fn new<F>(name: impl Into<Arc<str>>, predicate: F) -> Self
    where
        F: Fn(&Response) -> bool + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            predicate: Arc::new(predicate),
        }
    }

    pub fn status(status: u16) -> Self {
        Self::new(format!("status is {status}"), move |res| {
            res.error.is_none() && res.status == status
        })
    }

    pub fn duration_below(limit: Duration) -> Self {
        Self::new(
            format!("response time < {}", humantime::format_duration(limit)),
            move |res| res.duration < limit,
        )
    }

    pub fn body_contains(needle: impl Into<String>) -> Self {
        let needle = needle.into();
        Self::new(format!("body contains `{needle}`"), move |res| {
            res.body.contains(&needle)
        })
    }

    pub fn from_config(name: &str, condition: &CheckCondition) -> Self {
        let check = match condition {
            CheckCondition::Status(status) => Self::status(*status),
            CheckCondition::DurationBelow(limit) => Self::duration_below(*limit),
            CheckCondition::BodyContains(needle) => Self::body_contains(needle.clone()),
        };
        check.named(name)
    }

    pub fn named(mut self, name: impl Into<Arc<str>>) -> Self {
        self.name = name.into();
        self
    }

    /// Both checks must hold. Keeps this check's name.
    pub fn and(self, other: Check) -> Self {
        let (left, right) = (self.predicate, other.predicate);
        Self {
            name: self.name,
            predicate: Arc::new(move |res| left(res) && right(res)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn operation(&self) -> Arc<str> {
        self.name.clone()
    }

    pub fn evaluate(&self, response: &Response) -> bool {
        (self.predicate)(response)
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check").field("name", &self.name).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(status: u16, ms: u64) -> Response {
        Response {
            duration: Duration::from_millis(ms),
            ..Response::new(status)
        }
    }

    #[test]
    fn builtin_checks() {
        let status = Check::status(200);
        assert!(status.evaluate(&timed(200, 5)));
        assert!(!status.evaluate(&timed(500, 5)));
        assert!(!status.evaluate(&Response::transport_error("reset")));

        let fast = Check::duration_below(Duration::from_millis(50));
        assert_eq!(fast.name(), "response time < 50ms");
        assert!(fast.evaluate(&timed(200, 49)));
        assert!(!fast.evaluate(&timed(200, 50)));

        let body = Check::body_contains("ok");
        assert!(body.evaluate(&Response::new(200).body("all ok")));
        assert!(!body.evaluate(&Response::new(200)));
    }

    #[test]
    fn checks_compose() {
        let check = Check::status(200)
            .and(Check::duration_below(Duration::from_millis(50)))
            .named("fast success");

        assert_eq!(check.name(), "fast success");
        assert!(check.evaluate(&timed(200, 10)));
        assert!(!check.evaluate(&timed(200, 80)));
        assert!(!check.evaluate(&timed(404, 10)));
    }

    #[test]
    fn from_config_keeps_configured_name() {
        let check = Check::from_config("is created", &CheckCondition::Status(201));
        assert_eq!(check.name(), "is created");
        assert!(check.evaluate(&Response::new(201)));

        let check = Check::new("custom", |res| res.body.len() > 3);
        assert!(check.evaluate(&Response::new(200).body("long body")));
    }
}
