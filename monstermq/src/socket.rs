// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

#![allow(clippy::module_name_repetitions)]

use tokio::net::TcpListener;

use crate::error::Error;
#[cfg(target_os = "linux")]
use crate::error::ErrorKind;

#[cfg(target_os = "linux")]
fn bind_device(socket_fd: std::os::unix::io::RawFd, device: &str) -> Result<(), Error> {
    if !device.is_empty() {
        unsafe {
            #[allow(clippy::cast_possible_truncation)]
            let socket_len = device.len() as nc::socklen_t;
            nc::setsockopt(
                socket_fd,
                nc::SOL_SOCKET,
                nc::SO_BINDTODEVICE,
                device.as_ptr() as usize,
                socket_len,
            )
            .map_err(|errno| {
                Error::from_string(
                    ErrorKind::KernelError,
                    format!(
                        "Failed to bind device: {}, err: {}",
                        device,
                        nc::strerror(errno)
                    ),
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn bind_device(_socket_fd: i32, _device: &str) -> Result<(), Error> {
    Ok(())
}

/// Create a new tcp server socket at `address`, optionally bound to a
/// network `device`.
///
/// # Errors
///
/// Returns error if `address` is invalid or binding to `device` fails.
pub async fn new_tcp_listener(address: &str, device: &str) -> Result<TcpListener, Error> {
    let listener = TcpListener::bind(address).await?;

    #[cfg(target_os = "linux")]
    {
        use std::os::unix::io::AsRawFd;
        bind_device(listener.as_raw_fd(), device)?;
    }
    #[cfg(not(target_os = "linux"))]
    bind_device(0, device)?;

    Ok(listener)
}
