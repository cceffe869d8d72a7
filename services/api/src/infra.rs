use hostel_desk::config::StorageConfig;
use hostel_desk::hostel::{
    AuditReport, HostelRepository, HostelSnapshot, InMemoryHostelRepository, OccupancyAudit,
    SeedError,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Hydrate the store from the configured seed, or start empty when none is set.
pub(crate) fn build_repository(
    storage: &StorageConfig,
) -> Result<InMemoryHostelRepository, SeedError> {
    let Some(path) = storage.seed_path.as_deref() else {
        warn!("HOSTEL_SEED_PATH not set; starting with an empty hostel store");
        return Ok(InMemoryHostelRepository::default());
    };

    let snapshot = HostelSnapshot::from_path(path)?;
    let (rooms, students, allotments) = (
        snapshot.rooms.len(),
        snapshot.students.len(),
        snapshot.allotments.len(),
    );
    let repository = InMemoryHostelRepository::from_snapshot(snapshot)?;
    info!(
        seed = %path.display(),
        rooms,
        students,
        allotments,
        "hostel store hydrated"
    );
    Ok(repository)
}

/// Audit a snapshot without rejecting it, so every violation can be reported.
pub(crate) fn audit_seed(path: &Path) -> Result<AuditReport, SeedError> {
    let repository = InMemoryHostelRepository::import(HostelSnapshot::from_path(path)?)?;
    Ok(repository.read(|tx| OccupancyAudit::run(tx))?)
}
