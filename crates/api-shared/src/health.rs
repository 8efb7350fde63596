use crate::responses::HealthRes;

/// Simple health service that can be used by every API surface.
///
/// This service provides a standardised way to check the health status of the PROM backend.
#[derive(Clone, Default)]
pub struct HealthService;

impl HealthService {
    pub fn new() -> Self {
        Self
    }

    /// Static method to check health without creating an instance.
    pub fn check_health() -> HealthRes {
        HealthRes {
            ok: true,
            message: "PROM backend is alive".into(),
        }
    }
}
