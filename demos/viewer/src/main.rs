//! Minimal Lattice host.
//!
//! Discovers the modules bundled under this demo's `share/` directory, runs
//! the `profile.xml` next to it, and exits with the profile's return code.
//!
//! ```text
//! cargo run -p demo-viewer -- demos/viewer
//! ```

use std::path::PathBuf;

use tracing::{error, info};

use lattice::RuntimeResult;
use lattice::prelude::*;

fn main() {
    lattice::lattice_runtime::logging::init();

    let root = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."));

    let runtime = Runtime::global();
    match run(runtime, &root) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            error!(error = %e, "Unable to launch the application");
            std::process::exit(1);
        }
    }
}

fn run(runtime: &Runtime, root: &std::path::Path) -> RuntimeResult<i32> {
    runtime.add_modules(&root.join("share"))?;

    let profile = create_profile(&root.join("profile.xml"))?;
    info!(profile = %profile.name(), version = %profile.version(), "Profile loaded");

    profile.start(runtime)?;
    let code = profile.run(runtime);
    profile.stop(runtime);
    Ok(code)
}
