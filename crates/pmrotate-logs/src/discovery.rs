//! Discovery: turn the supervisor's process table into evaluation requests

use pmrotate_core::{EvaluationRequest, ManagedProcess, Result};
use pmrotate_ipc::ProcessSource;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Build the evaluation requests for one pass, in process-table order.
///
/// Modules are skipped when module rotation is off. Clustered instances
/// sharing exactly the same three log paths as the last recorded instance
/// of that name are queued once.
pub fn plan(
    processes: &[ManagedProcess],
    rotate_module: bool,
    force: bool,
) -> Vec<EvaluationRequest> {
    let mut last_seen: HashMap<&str, &ManagedProcess> = HashMap::new();
    let mut requests = Vec::new();

    for process in processes {
        if process.is_module && !rotate_module {
            debug!("Skipping module {}", process.name);
            continue;
        }

        if process.instances > 1
            && last_seen
                .get(process.name.as_str())
                .is_some_and(|previous| previous.has_same_logs(process))
        {
            continue;
        }

        last_seen.insert(process.name.as_str(), process);
        requests.extend(
            process
                .log_paths()
                .into_iter()
                .map(|path| EvaluationRequest::new(path, force)),
        );
    }

    requests
}

/// Queries the supervisor and plans a pass
pub struct Discovery {
    source: Arc<dyn ProcessSource>,
    rotate_module: bool,
}

impl Discovery {
    pub fn new(source: Arc<dyn ProcessSource>, rotate_module: bool) -> Self {
        Self {
            source,
            rotate_module,
        }
    }

    /// Fetch a fresh process table and plan it. A supervisor error fails
    /// the whole pass; nothing is queued.
    pub async fn discover(&self, force: bool) -> Result<Vec<EvaluationRequest>> {
        let processes = self.source.list_processes().await?;

        let names: Vec<&str> = processes.iter().map(|p| p.name.as_str()).collect();
        info!("apps: {:?}", names);

        Ok(plan(&processes, self.rotate_module, force))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use pmrotate_core::Error;
    use std::path::PathBuf;

    struct StaticSource(Vec<ManagedProcess>);

    #[async_trait]
    impl ProcessSource for StaticSource {
        async fn list_processes(&self) -> Result<Vec<ManagedProcess>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSource;

    #[async_trait]
    impl ProcessSource for BrokenSource {
        async fn list_processes(&self) -> Result<Vec<ManagedProcess>> {
            Err(Error::ipc("Connection closed by supervisor"))
        }
    }

    fn paths(requests: &[EvaluationRequest]) -> Vec<PathBuf> {
        requests.iter().map(|r| r.path.clone()).collect()
    }

    fn cluster_instance() -> ManagedProcess {
        ManagedProcess::new("api")
            .with_instances(2)
            .with_out_log("/logs/api-out.log")
            .with_err_log("/logs/api-err.log")
            .with_combined_log("/logs/api.log")
    }

    #[test]
    fn test_plan_queues_distinct_roles() {
        let processes = vec![ManagedProcess::new("web")
            .with_out_log("/logs/web.log")
            .with_err_log("/logs/web.log")
            .with_combined_log("/logs/web-all.log")];

        let requests = plan(&processes, true, false);
        assert_eq!(
            paths(&requests),
            vec![PathBuf::from("/logs/web.log"), PathBuf::from("/logs/web-all.log")]
        );
        assert!(requests.iter().all(|r| !r.force));
    }

    #[test]
    fn test_plan_dedups_shared_cluster_logs() {
        let processes = vec![cluster_instance(), cluster_instance()];

        let requests = plan(&processes, true, true);
        assert_eq!(requests.len(), 3);
        assert!(requests.iter().all(|r| r.force));
    }

    #[test]
    fn test_plan_keeps_per_instance_logs() {
        let processes = vec![
            ManagedProcess::new("api")
                .with_instances(2)
                .with_out_log("/logs/api-out-0.log"),
            ManagedProcess::new("api")
                .with_instances(2)
                .with_out_log("/logs/api-out-1.log"),
        ];

        let requests = plan(&processes, true, false);
        assert_eq!(
            paths(&requests),
            vec![
                PathBuf::from("/logs/api-out-0.log"),
                PathBuf::from("/logs/api-out-1.log")
            ]
        );
    }

    #[test]
    fn test_plan_same_name_single_instance_not_deduped() {
        let single = cluster_instance().with_instances(1);
        let requests = plan(&[single.clone(), single], true, false);
        assert_eq!(requests.len(), 6);
    }

    #[test]
    fn test_plan_skips_modules_when_disabled() {
        let processes = vec![
            ManagedProcess::new("pmrotate")
                .as_module()
                .with_out_log("/logs/pmrotate.log"),
            ManagedProcess::new("web").with_out_log("/logs/web.log"),
        ];

        assert_eq!(
            paths(&plan(&processes, false, false)),
            vec![PathBuf::from("/logs/web.log")]
        );
        assert_eq!(plan(&processes, true, false).len(), 2);
    }

    #[test]
    fn test_plan_preserves_table_order() {
        let processes = vec![
            ManagedProcess::new("zeta").with_out_log("/logs/zeta.log"),
            ManagedProcess::new("alpha").with_out_log("/logs/alpha.log"),
        ];
        assert_eq!(
            paths(&plan(&processes, true, false)),
            vec![PathBuf::from("/logs/zeta.log"), PathBuf::from("/logs/alpha.log")]
        );
    }

    #[tokio::test]
    async fn test_discover() {
        let source = Arc::new(StaticSource(vec![cluster_instance(), cluster_instance()]));
        let discovery = Discovery::new(source, true);

        let requests = discovery.discover(false).await.unwrap();
        assert_eq!(requests.len(), 3);
    }

    #[tokio::test]
    async fn test_discover_supervisor_error_aborts_pass() {
        let discovery = Discovery::new(Arc::new(BrokenSource), true);
        assert!(discovery.discover(true).await.is_err());
    }
}
