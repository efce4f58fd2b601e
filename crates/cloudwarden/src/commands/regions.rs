use crate::context::Context;
use crate::render::{self, Table};
use cloudwarden_cloud_aws::Inventory;

pub async fn handle(ctx: &Context) -> anyhow::Result<u8> {
    let session = ctx.global_session().await?;
    let regions = Inventory::new(&session).list_regions().await?;

    let mut table = Table::new(&["REGION", "ENDPOINT", "OPT-IN"]);
    for region in &regions {
        table.row(vec![
            region.name.clone(),
            region.endpoint.clone().unwrap_or_else(|| "-".to_string()),
            region.opt_in_status.clone().unwrap_or_else(|| "-".to_string()),
        ]);
    }
    render::emit(ctx.output, &regions, &table)?;
    Ok(0)
}
