use anyhow::Result;

use crate::registry::Registry;

pub fn list_command() -> Result<i32> {
    for signature in Registry::builtin().signatures() {
        println!("{}", signature);
    }
    Ok(0)
}
