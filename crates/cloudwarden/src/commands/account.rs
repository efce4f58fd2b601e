use crate::context::Context;
use crate::render::{self, Table};
use serde::Serialize;

#[derive(Serialize)]
struct Identity<'a> {
    account: &'a str,
    region: &'a str,
    profile: Option<&'a str>,
}

/// Print the account the resolved credentials belong to
pub async fn handle(ctx: &Context) -> anyhow::Result<u8> {
    let session = ctx.global_session().await?;
    let identity = Identity {
        account: session.account(),
        region: session.region(),
        profile: session.profile(),
    };
    let mut table = Table::new(&["ACCOUNT", "REGION", "PROFILE"]);
    table.row(vec![
        identity.account.to_string(),
        identity.region.to_string(),
        identity.profile.unwrap_or("default").to_string(),
    ]);
    render::emit(ctx.output, &identity, &table)?;
    Ok(0)
}
