// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

/// Example application wiring `chsk-server` into an `axum` router.
#[derive(Debug, Clone, Parser)]
#[command(name = "chsk-demo", version, about)]
pub struct DemoConfig {
    /// Host to bind on.
    #[arg(long, default_value = "127.0.0.1", env = "CHSK_DEMO_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(long, default_value_t = 3000, env = "CHSK_DEMO_PORT")]
    pub port: u16,

    /// Path the chsk endpoint is mounted at.
    #[arg(long, default_value = "/chsk", env = "CHSK_DEMO_PATH")]
    pub path: String,
}

impl DemoConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
