use crate::context::Context;
use crate::render::{self, Table};
use clap::Args;
use cloudwarden_cloud_aws::Inventory;

#[derive(Args, Debug)]
pub struct S3Args {
    /// List object keys in this bucket instead of listing buckets
    #[arg(long)]
    pub bucket: Option<String>,

    /// Key prefix within --bucket
    #[arg(long, requires = "bucket")]
    pub prefix: Option<String>,

    /// Stop after this many keys
    #[arg(long, value_name = "N", requires = "bucket")]
    pub max_keys: Option<usize>,
}

pub async fn handle(ctx: &Context, args: &S3Args) -> anyhow::Result<u8> {
    let session = ctx.global_session().await?;
    let inventory = Inventory::new(&session);

    match &args.bucket {
        None => {
            let buckets = inventory.list_buckets().await?;
            let mut table = Table::new(&["BUCKET", "CREATED"]);
            for bucket in &buckets {
                table.row(vec![bucket.name.clone(), render::timestamp(bucket.created_at)]);
            }
            render::emit(ctx.output, &buckets, &table)?;
        }
        Some(bucket) => {
            let objects = inventory
                .list_objects(bucket, args.prefix.as_deref(), args.max_keys)
                .await?;
            let mut table = Table::new(&["KEY", "SIZE", "LAST MODIFIED", "STORAGE CLASS"]);
            for object in &objects {
                table.row(vec![
                    object.key.clone(),
                    object.size.to_string(),
                    render::timestamp(object.last_modified),
                    object.storage_class.clone().unwrap_or_else(|| "-".to_string()),
                ]);
            }
            render::emit(ctx.output, &objects, &table)?;
        }
    }
    Ok(0)
}
