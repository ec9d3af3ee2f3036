use std::{io, net::Ipv4Addr, time::Duration};

use tokio::{net::TcpListener, sync::watch, time::sleep};

use crate::{
    config::ServerConfig,
    hardware::{Clock, Sensors},
    state::SharedState,
};

pub mod session;

pub use session::Session;

/// Lifecycle of the single operator link, published for observers.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

/// Owns the listening socket and serves one operator session at a time.
///
/// Binding happens once at startup and a failure there is fatal; everything
/// after that is recoverable: a failed or finished session returns the
/// manager to listening, and accept errors back off with a bounded delay.
pub struct ConnectionManager<S, C> {
    listener: TcpListener,
    state: SharedState,

    sensors: S,
    clock: C,

    idle_timeout: Duration,
    accept_backoff: Duration,
    max_backoff: Duration,

    connection: watch::Sender<ConnectionState>,
}

impl<S: Sensors, C: Clock> ConnectionManager<S, C> {
    pub async fn bind(
        config: &ServerConfig,
        state: SharedState,
        sensors: S,
        clock: C,
    ) -> io::Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port)).await?;
        let (connection, _) = watch::channel(ConnectionState::default());

        Ok(Self {
            listener,
            state,
            sensors,
            clock,
            idle_timeout: config.idle_timeout(),
            accept_backoff: config.accept_backoff(),
            max_backoff: config.max_backoff(),
            connection,
        })
    }

    pub fn local_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.listener.local_addr()
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.connection.subscribe()
    }

    pub async fn run(mut self) {
        tracing::info!("Waiting for an operator connection");

        let mut backoff = self.accept_backoff;

        loop {
            self.connection.send_replace(ConnectionState::Connecting);

            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,

                Err(error) => {
                    tracing::error!(%error, "Failed to accept a connection");
                    sleep(backoff).await;
                    backoff = (backoff * 2).min(self.max_backoff);
                    continue;
                }
            };

            backoff = self.accept_backoff;

            tracing::info!(%peer, "Operator connected");
            self.connection.send_replace(ConnectionState::Connected);

            let session = Session::new(
                stream,
                self.state.clone(),
                &mut self.sensors,
                &mut self.clock,
                self.idle_timeout,
            );

            match session.run().await {
                Ok(()) => tracing::info!(%peer, "Session ended"),
                Err(error) => tracing::warn!(%peer, %error, "Session aborted"),
            }

            self.connection.send_replace(ConnectionState::Disconnected);
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpStream,
    };

    use crate::{
        config::Config,
        hardware::{SystemClock, sim},
        state::StationState,
    };

    use super::*;

    async fn read_line(stream: &mut TcpStream) -> String {
        let mut line = Vec::new();

        loop {
            match stream.read_u8().await.unwrap() {
                b'\n' => return String::from_utf8(line).unwrap(),
                byte => line.push(byte),
            }
        }
    }

    #[tokio::test]
    async fn test_serves_peers_one_after_another() {
        let config = Config::default();
        let state = StationState::from_config(&config).into_shared();

        let (sensors, _actuators) = sim::simulated();

        let server = ServerConfig {
            port: 0,
            ..Default::default()
        };

        let manager = ConnectionManager::bind(&server, state.clone(), sensors, SystemClock)
            .await
            .unwrap();

        let addr = manager.local_addr().unwrap();
        let mut connection = manager.connection_state();

        tokio::spawn(manager.run());

        // First peer sets both override flags, then disconnects.
        let mut peer = TcpStream::connect(addr).await.unwrap();
        peer.write_all(b"413").await.unwrap();
        read_line(&mut peer).await;
        read_line(&mut peer).await;
        drop(peer);

        assert!(state.lock().await.control.force_recording);
        assert!(state.lock().await.control.force_fan);

        // Manager returns to listening and serves a second peer. The
        // resting state between sessions is Connecting (blocked in accept).
        connection
            .wait_for(|c| *c == ConnectionState::Connecting)
            .await
            .unwrap();

        let mut peer = TcpStream::connect(addr).await.unwrap();
        peer.write_all(b"44").await.unwrap();
        read_line(&mut peer).await;

        assert!(!state.lock().await.control.force_fan);
    }
}
