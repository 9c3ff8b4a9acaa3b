// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! CRD YAML Generator
//!
//! Writes the `DNSEndpoint` CRD defined in src/crd.rs to deploy/crds/, or
//! to stdout with `--stdout`.
//!
//! Usage:
//!   cargo run --bin crdgen
//!   cargo run --bin crdgen -- --stdout | kubectl apply -f -

use dnsync::crd::DNSEndpoint;
use kube::CustomResourceExt;
use std::fs;
use std::path::Path;

const COPYRIGHT_HEADER: &str = "# Copyright (c) 2025 Erick Bourgeois, firestoned
# SPDX-License-Identifier: MIT
#
# This file is AUTO-GENERATED from src/crd.rs
# DO NOT EDIT MANUALLY - Run `cargo run --bin crdgen` to regenerate
#
";

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let yaml = render::<DNSEndpoint>()?;

    if std::env::args().any(|arg| arg == "--stdout") {
        print!("{yaml}");
        return Ok(());
    }

    let output_dir = Path::new("deploy/crds");
    fs::create_dir_all(output_dir)?;
    let output_path = output_dir.join("dnsendpoints.crd.yaml");
    fs::write(&output_path, yaml)?;
    println!("✓ Generated {}", output_path.display());

    Ok(())
}

fn render<T>() -> Result<String, Box<dyn std::error::Error>>
where
    T: CustomResourceExt,
{
    let crd = T::crd();
    let yaml = serde_yaml::to_string(&crd)?;
    Ok(format!("{COPYRIGHT_HEADER}{yaml}"))
}
