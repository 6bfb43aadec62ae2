// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// Bound server socket of one listener.
pub enum Protocol {
    /// Plain TCP.
    Mqtt(TcpListener),

    /// TCP with TLS.
    Mqtts(TcpListener, TlsAcceptor),

    /// WebSocket.
    Ws(TcpListener),

    /// WebSocket with TLS.
    Wss(TcpListener, TlsAcceptor),
}
