use crate::Cli;
use crate::error::Result;

use crdb_bootstrap::StateStore;

pub async fn status(cli: &Cli) -> Result<()> {
    let state = super::state_store(cli).load().await?;

    println!("{}: {}", cli.unit, state.unit.status);

    if !state.deferred.is_empty() {
        let deferred: Vec<_> = state.deferred.iter().map(ToString::to_string).collect();
        println!("deferred: {}", deferred.join(", "));
    }

    Ok(())
}
