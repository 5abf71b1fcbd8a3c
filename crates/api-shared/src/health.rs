use crate::dto::HealthRes;

/// Health check shared by the REST server and the CLI.
#[derive(Clone, Debug, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static method to check health without creating an instance
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "Care portal is alive".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_health_reports_ok() {
        let res = HealthService::check_health();
        assert!(res.ok);
        assert!(!res.message.is_empty());
    }
}
