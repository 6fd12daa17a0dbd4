// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;
mod services;

use std::sync::Arc;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use config::{log_level_from_env, AgentConfig};
use service_dispatcher::Dispatcher;
use services::{HeartbeatService, ShutdownTimer};

pub fn main() {
    let log_level = log_level_from_env();

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(log_level).expect("could not parse log level in configuration"),
        )
        .with_level(true)
        .with_thread_names(true)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match AgentConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error creating config on agent startup: {e}");
            return;
        }
    };

    let dispatcher = match Dispatcher::install(config.dispatcher.clone()) {
        Ok(dispatcher) => dispatcher,
        Err(e) => {
            error!("Error initializing service dispatcher: {e}");
            return;
        }
    };

    let heartbeat = Arc::new(HeartbeatService::new(config.heartbeat_interval));
    if let Err(e) = dispatcher.add_service(heartbeat) {
        error!("Error starting heartbeat service: {e}");
    }

    match config.run_duration {
        Some(run_duration) => {
            let timer = Arc::new(ShutdownTimer::new(run_duration, dispatcher));
            if let Err(e) = dispatcher.add_service(timer) {
                error!("Error starting shutdown timer: {e}");
            }
        }
        None => info!("No run duration configured, running until services exit"),
    }

    info!(
        services = ?dispatcher.active_services(),
        "Agent services started"
    );

    dispatcher.join_services();
    info!("All services stopped, exiting");
}
