//! Node level settings served by the panel.

use tracing::info;

use gameap_config::{DaemonConfig, NodeInitData};
use gameap_core::{ApiError, ApiRequest, ApiRequestMaker};

/// Fetches the node init data and fills the fields left empty in `cfg`.
pub async fn init_node_config(
    api: &dyn ApiRequestMaker,
    cfg: &mut DaemonConfig,
) -> Result<(), ApiError> {
    let response = api
        .request(
            ApiRequest::get("/gdaemon_api/dedicated_servers/get_init_data/{id}")
                .with_path_param("id", cfg.node_id),
        )
        .await?;

    if response.status != 200 {
        return Err(response.invalid());
    }

    let data: NodeInitData = response.json()?;
    data.apply_to(cfg);

    info!(
        log_type = "supervisor",
        "Node configuration initialized, work path {}",
        cfg.work_path
    );

    Ok(())
}
