//! Load generator: a fleet of VMs that allocate, renew and sometimes vanish.

use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{info, warn};

struct Settings {
    client_interval: Duration,
    expiration_chance: f64,
    liveness_interval: Duration,
    server_url: String,
    simulation: Duration,
    total_clients: usize,
}

impl Settings {
    fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            client_interval: Duration::from_millis(env_or("CLIENT_INTERVAL_MS", 10)?),
            expiration_chance: env_or("EXPIRATION_CHANCE", 0.02)?,
            liveness_interval: Duration::from_secs(env_or("LIVENESS_INTERVAL_SECONDS", 10)?),
            server_url: std::env::var("SERVER_URL")
                .unwrap_or_else(|_| "http://localhost:8080".to_string()),
            simulation: Duration::from_secs(env_or("SIMULATION_SECONDS", 300)?),
            total_clients: env_or("TOTAL_CLIENTS", 1200)?,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {key}: {value:?}")),
        Err(_) => Ok(default),
    }
}

#[derive(Serialize)]
struct AllocateRequest<'a> {
    client_id: &'a str,
}

#[derive(Serialize)]
struct LivenessRequest<'a> {
    client_id: &'a str,
    identifier: &'a str,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct AllocateResponse {
    identifier: String,
}

struct SimulatedClient {
    identifier: String,
    last_seen: Instant,
}

struct Simulation {
    clients: HashMap<String, SimulatedClient>,
    http: reqwest::Client,
    settings: Settings,
}

impl Simulation {
    async fn tick(&mut self) {
        if self.clients.len() < self.settings.total_clients && rand::random::<f64>() < 0.8 {
            self.register().await;
        }

        let now = Instant::now();
        let ids: Vec<String> = self.clients.keys().cloned().collect();
        for id in ids {
            if rand::random::<f64>() < self.settings.expiration_chance {
                if let Some(client) = self.clients.remove(&id) {
                    info!(client_id = %id, identifier = %client.identifier, "Client abandoning its identifier");
                }
                continue;
            }

            let due = self
                .clients
                .get(&id)
                .is_some_and(|c| now.duration_since(c.last_seen) >= self.settings.liveness_interval);
            if due {
                self.send_liveness(&id).await;
            }
        }
    }

    async fn register(&mut self) {
        let client_id = uuid::Uuid::new_v4().to_string();
        let url = format!("{}/allocate", self.settings.server_url);

        let response = match self
            .http
            .post(&url)
            .json(&AllocateRequest {
                client_id: &client_id,
            })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Failed to register client");
                return;
            }
        };

        if !response.status().is_success() {
            warn!(client_id = %client_id, status = %response.status(), "Failed to register client");
            return;
        }

        let identifier = match response.json::<Envelope<AllocateResponse>>().await {
            Ok(body) => body.data.identifier,
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Unreadable allocation response");
                return;
            }
        };

        info!(client_id = %client_id, identifier = %identifier, "Registered new client");
        // Due for liveness on the next tick
        let last_seen = Instant::now()
            .checked_sub(self.settings.liveness_interval)
            .unwrap_or_else(Instant::now);
        self.clients.insert(
            client_id,
            SimulatedClient {
                identifier,
                last_seen,
            },
        );
    }

    async fn send_liveness(&mut self, client_id: &str) {
        let Some(identifier) = self.clients.get(client_id).map(|c| c.identifier.clone()) else {
            return;
        };
        let url = format!("{}/liveness", self.settings.server_url);

        let result = self
            .http
            .post(&url)
            .json(&LivenessRequest {
                client_id,
                identifier: &identifier,
            })
            .send()
            .await;

        match result {
            Err(e) => {
                warn!(client_id = %client_id, error = %e, "Failed to send liveness");
            }
            Ok(response) if !response.status().is_success() => {
                warn!(
                    client_id = %client_id,
                    identifier = %identifier,
                    status = %response.status(),
                    "Liveness rejected, shutting client down"
                );
                self.clients.remove(client_id);
            }
            Ok(_) => {
                if let Some(client) = self.clients.get_mut(client_id) {
                    client.last_seen = Instant::now();
                }
                tracing::debug!(client_id = %client_id, identifier = %identifier, "Sent liveness");
            }
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let settings = Settings::from_env()?;
    info!(
        server_url = %settings.server_url,
        total_clients = settings.total_clients,
        "Starting lease simulation"
    );

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(5))
        .build()?;

    let stop = tokio::time::sleep(settings.simulation);
    tokio::pin!(stop);

    let mut ticker = tokio::time::interval(settings.client_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut simulation = Simulation {
        clients: HashMap::new(),
        http,
        settings,
    };

    loop {
        tokio::select! {
            _ = &mut stop => break,
            _ = ticker.tick() => simulation.tick().await,
        }
    }

    info!(
        active_clients = simulation.clients.len(),
        "Simulation complete"
    );
    Ok(())
}
