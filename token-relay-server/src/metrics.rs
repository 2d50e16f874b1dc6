use actix_web::{App, HttpServer, dev::Server};
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use anyhow::Context;
use std::net::SocketAddr;

/// Serves the default prometheus registry, where the relay counters live.
pub struct Metrics {
    middleware: PrometheusMetrics,
}

impl Metrics {
    pub fn new(service_name: &str, route: &str) -> anyhow::Result<Self> {
        let middleware = PrometheusMetricsBuilder::new(service_name)
            .registry(prometheus::default_registry().clone())
            .endpoint(route)
            .build()
            .map_err(|err| anyhow::anyhow!("failed to build metrics middleware: {err}"))?;
        Ok(Self { middleware })
    }

    pub fn run_server(self, addr: SocketAddr) -> anyhow::Result<Server> {
        let middleware = self.middleware;
        let server = HttpServer::new(move || App::new().wrap(middleware.clone()))
            .bind(addr)
            .with_context(|| format!("failed to bind metrics server to {addr}"))?
            .run();
        Ok(server)
    }
}
