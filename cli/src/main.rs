use behave_cli::{demo, init_tracing, run_catalog, BehaveCli};
use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = BehaveCli::parse();
    init_tracing(cli.verbose);

    let catalog = demo::catalog()?;
    if !run_catalog(&catalog, cli)? {
        anyhow::bail!("specification run failed");
    }
    Ok(())
}
