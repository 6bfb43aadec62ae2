// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

//! `ServerContext` is the main entry point of the broker: it wires the
//! actor modules together and owns the process signals.

use std::fs::File;
use std::io::{Read, Write};
use tokio::runtime::Runtime;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::mpsc::Sender;

use crate::commands::{ServerContextToAuthCmd, ServerContextToMetricsCmd};
use crate::config::Config;
use crate::error::{Error, ErrorKind};

mod init;
pub mod run;

pub const CHANNEL_CAPACITY: usize = 16;

/// Owns the module lifecycles and handles kernel signals.
pub struct ServerContext {
    config: Config,

    auth_sender: Option<Sender<ServerContextToAuthCmd>>,
    metrics_sender: Option<Sender<ServerContextToMetricsCmd>>,
}

impl ServerContext {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            auth_sender: None,
            metrics_sender: None,
        }
    }

    /// Send `SIGUSR1` to a running broker process.
    ///
    /// # Errors
    ///
    /// Returns error if the pid file is unreadable or the process is
    /// gone.
    pub fn send_reload_signal(&mut self) -> Result<(), Error> {
        #[cfg(target_os = "linux")]
        return self.send_signal(nc::SIGUSR1);

        #[cfg(not(target_os = "linux"))]
        return self.send_signal(0);
    }

    /// Send `SIGTERM` to a running broker process.
    ///
    /// # Errors
    ///
    /// Returns error if the pid file is unreadable or the process is
    /// gone.
    pub fn send_stop_signal(&mut self) -> Result<(), Error> {
        #[cfg(target_os = "linux")]
        return self.send_signal(nc::SIGTERM);

        #[cfg(not(target_os = "linux"))]
        return self.send_signal(0);
    }

    #[cfg(not(target_os = "linux"))]
    fn send_signal(&mut self, _sig: i32) -> Result<(), Error> {
        Ok(())
    }

    #[cfg(target_os = "linux")]
    fn send_signal(&mut self, sig: i32) -> Result<(), Error> {
        let mut fd = File::open(self.config.general().pid_file())?;
        let mut pid_str = String::new();
        fd.read_to_string(&mut pid_str)?;
        let pid = pid_str.trim().parse::<i32>().map_err(|err| {
            Error::from_string(
                ErrorKind::PidError,
                format!(
                    "Failed to parse pid {pid_str} from file {:?}, err: {err:?}",
                    self.config.general().pid_file()
                ),
            )
        })?;

        unsafe {
            nc::kill(pid, sig).map_err(|errno| {
                Error::from_string(
                    ErrorKind::PidError,
                    format!("Failed to notify process {pid}, got {}", nc::strerror(errno)),
                )
            })?;
        }
        Ok(())
    }

    fn write_pid(&self) -> Result<(), Error> {
        let pid = std::process::id();
        let mut fd = File::create(self.config.general().pid_file()).map_err(|err| {
            Error::from_string(
                ErrorKind::IoError,
                format!(
                    "Failed to write pid to file {:?}, got err: {err:?}",
                    self.config.general().pid_file()
                ),
            )
        })?;
        write!(fd, "{pid}")?;
        Ok(())
    }

    /// Init modules and run the tokio runtime until a stop signal.
    ///
    /// # Errors
    ///
    /// Returns error if the config is invalid, the pid file cannot be
    /// written or a module fails to initialize. A storage failure at
    /// startup is fatal.
    pub fn run_loop(&mut self, runtime: &Runtime) -> Result<(), Error> {
        self.config.validate()?;
        self.write_pid()?;

        runtime.block_on(async {
            self.init_modules().await?;
            self.run_inner_loop().await
        })
    }

    async fn run_inner_loop(&mut self) -> Result<(), Error> {
        log::info!("ServerContext::run_inner_loop()");
        let mut sigusr1_stream = signal(SignalKind::user_defined1())?;
        let mut sigterm_stream = signal(SignalKind::terminate())?;
        let mut sigquit_stream = signal(SignalKind::quit())?;
        let mut sigint_stream = signal(SignalKind::interrupt())?;

        loop {
            tokio::select! {
                Some(()) = sigusr1_stream.recv() => {
                    log::info!("SIGUSR1: reloading users and acl");
                    if let Some(sender) = &self.auth_sender {
                        if let Err(err) = sender.send(ServerContextToAuthCmd::ReloadUsers).await {
                            log::error!("Failed to send reload cmd: {err:?}");
                        }
                    }
                }
                Some(()) = sigterm_stream.recv() => {
                    log::info!("Quit with SIGTERM");
                    break;
                }
                Some(()) = sigquit_stream.recv() => {
                    log::info!("Quit with SIGQUIT");
                    break;
                }
                Some(()) = sigint_stream.recv() => {
                    log::info!("Quit with SIGINT");
                    break;
                }
            }
        }

        Ok(())
    }

    /// Current uptime in seconds, served by the metrics module.
    ///
    /// # Errors
    ///
    /// Returns error if the metrics module is not running.
    pub async fn uptime(&self) -> Result<u64, Error> {
        let Some(sender) = &self.metrics_sender else {
            return Err(Error::new(ErrorKind::StatusError, "metrics not running"));
        };
        let (tx, rx) = tokio::sync::oneshot::channel();
        sender
            .send(ServerContextToMetricsCmd::GetUptime(tx))
            .await
            .map_err(|err| {
                Error::from_string(ErrorKind::ChannelError, format!("uptime request: {err}"))
            })?;
        rx.await
            .map_err(|err| Error::from_string(ErrorKind::ChannelError, format!("uptime: {err}")))
    }
}
