// src/routes/ws.rs

use std::sync::Arc;

use actix::{Actor, ActorContext, AsyncContext, StreamHandler};
use actix_web::{get, web, Error, HttpRequest, HttpResponse, Responder};
use actix_web_actors::ws;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use uuid::Uuid;

use crate::services::broadcaster::Broadcaster;
use crate::utils::types::{ApiResponse, Timeframe};

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    #[serde(default = "default_timeframe")]
    pub timeframe: String,
}

fn default_timeframe() -> String {
    "5m".to_string()
}

/// One streaming client. On start the actor registers an unbounded channel
/// with the broadcaster and forwards every published snapshot as a text
/// frame; the registration is dropped when the actor stops, whichever side
/// closed first.
struct ScannerSocket {
    id: Uuid,
    timeframe: Timeframe,
    broadcaster: Arc<Broadcaster>,
}

impl ScannerSocket {
    fn new(timeframe: Timeframe, broadcaster: Arc<Broadcaster>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timeframe,
            broadcaster,
        }
    }
}

impl Actor for ScannerSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        self.broadcaster.register(self.timeframe, self.id, tx);
        ctx.add_stream(UnboundedReceiverStream::new(rx));
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.broadcaster.unregister(self.timeframe, self.id);
    }
}

/// Outbound snapshots from the broadcaster.
impl StreamHandler<String> for ScannerSocket {
    fn handle(&mut self, message: String, ctx: &mut Self::Context) {
        ctx.text(message);
    }
}

/// Inbound client frames; anything textual is treated as a heartbeat.
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ScannerSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => ctx.pong(&payload),
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(error = %e, "ws protocol error, closing");
                ctx.stop();
            }
        }
    }
}

#[get("/ws/scanner")]
pub async fn ws_scanner(
    req: HttpRequest,
    stream: web::Payload,
    query: web::Query<WsQuery>,
    broadcaster: web::Data<Broadcaster>,
) -> Result<impl Responder, Error> {
    let Ok(timeframe) = query.timeframe.parse::<Timeframe>() else {
        return Ok(HttpResponse::BadRequest().json(ApiResponse::<()> {
            success: false,
            message: Some(format!("unsupported timeframe: {}", query.timeframe)),
            data: None,
        }));
    };

    ws::start(
        ScannerSocket::new(timeframe, broadcaster.into_inner()),
        &req,
        stream,
    )
}
