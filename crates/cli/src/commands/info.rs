use anyhow::Result;
use comliner_core::JsonFileStore;

use super::run::prepare;
use crate::cli::RunArgs;
use crate::display::print_plan;
use crate::registry::Registry;

pub fn info_command(args: &RunArgs) -> Result<i32> {
    let registry = Registry::builtin();
    let setup = prepare(args, &registry)?;
    let store = JsonFileStore::new();
    let driver = setup.driver(&store)?;
    let plan = driver.plan_sources(&args.args)?;

    print_plan(setup.function.signature(), &driver, &plan);
    Ok(0)
}
