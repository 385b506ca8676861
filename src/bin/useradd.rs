#![cfg(not(tarpaulin_include))]

use cacm_desa::login::{Role, init_database, register_user};
use std::env;
use std::path::Path;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();
    if args.len() < 5 {
        eprintln!(
            "Usage: {} <database_dir> <username> <password> <admin|inspektorat|desa> [kd_pemda]",
            args[0]
        );
        return Ok(());
    }

    let database_dir = Path::new(&args[1]);
    let role: Role = args[4].parse()?;
    let kd_pemda = args.get(5).map(String::as_str);

    init_database(database_dir)?;
    register_user(&database_dir.join("users.json"), &args[2], &args[3], role, kd_pemda)?;

    println!("Added {} ({:?}) to {}", args[2], role, database_dir.display());
    Ok(())
}
