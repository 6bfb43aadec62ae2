// Copyright (c) 2025 MonsterMQ Authors. All rights reserved.
// Use of this source is governed by GNU General Public License that can be found
// in the LICENSE file.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_rustls::server::TlsStream;
use tokio_tungstenite::{tungstenite::protocol::Message, WebSocketStream};

use crate::error::Error;

/// Each Stream represents a duplex socket connection to one client.
///
/// Listening on a transport and speaking another is rejected at accept
/// time: a raw MQTT connect on a WebSocket port fails the upgrade
/// handshake, and WebSocket frames on a TCP port fail packet decoding.
#[derive(Debug)]
pub enum Stream {
    Mqtt(TcpStream),
    Mqtts(Box<TlsStream<TcpStream>>),
    Ws(Box<WebSocketStream<TcpStream>>),
    Wss(Box<WebSocketStream<TlsStream<TcpStream>>>),
}

impl Stream {
    /// Read available bytes into `buf`. Zero means the peer closed the
    /// connection.
    ///
    /// # Errors
    ///
    /// Returns error if the socket or websocket stream fails.
    pub async fn read_buf(&mut self, buf: &mut Vec<u8>) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp_stream) => Ok(tcp_stream.read_buf(buf).await?),
            Self::Mqtts(tls_stream) => Ok(tls_stream.read_buf(buf).await?),
            Self::Ws(ws_stream) => Self::read_ws_frame(ws_stream.next().await, buf),
            Self::Wss(wss_stream) => Self::read_ws_frame(wss_stream.next().await, buf),
        }
    }

    fn read_ws_frame(
        frame: Option<Result<Message, tokio_tungstenite::tungstenite::Error>>,
        buf: &mut Vec<u8>,
    ) -> Result<usize, Error> {
        match frame {
            Some(frame) => {
                let data = frame?.into_data();
                let data_len = data.len();
                buf.extend(data);
                Ok(data_len)
            }
            None => Ok(0),
        }
    }

    /// Write the whole buffer to the stream.
    ///
    /// # Errors
    ///
    /// Returns error if the socket or websocket stream fails.
    pub async fn write(&mut self, buf: &[u8]) -> Result<usize, Error> {
        match self {
            Self::Mqtt(tcp_stream) => {
                tcp_stream.write_all(buf).await?;
                Ok(buf.len())
            }
            Self::Mqtts(tls_stream) => {
                tls_stream.write_all(buf).await?;
                Ok(buf.len())
            }
            Self::Ws(ws_stream) => {
                ws_stream.send(Message::binary(buf.to_vec())).await?;
                Ok(buf.len())
            }
            Self::Wss(wss_stream) => {
                wss_stream.send(Message::binary(buf.to_vec())).await?;
                Ok(buf.len())
            }
        }
    }
}
