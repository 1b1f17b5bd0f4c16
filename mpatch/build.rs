//! Build script for mpatch.
//!
//! Stamps the build with an identity, derived from the build time, so that a restore point set by one firmware is
//! never restored by another.
//!
//! No `rerun-if` directive is emitted: the identity is refreshed whenever any file of the package changes.

use std::{env, time::{SystemTime, UNIX_EPOCH}};

fn main() {
    //  SOURCE_DATE_EPOCH, when set, pins the identity for reproducible builds.
    let seconds = env::var("SOURCE_DATE_EPOCH")
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|elapsed| elapsed.as_secs())
                .unwrap_or(0)
        });

    println!("cargo:rustc-env=MPATCH_BUILD_ID={}", seconds as u32);
}
