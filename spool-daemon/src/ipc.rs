use crate::dispatch;
use crate::errors::{ErrorCode, ErrorDomain, SpoolError};
use crate::registry::{Context, Registry};
use crate::types::{Request, Response};
use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::watch;
use uuid::Uuid;

pub struct IpcServer {
    socket_path: PathBuf,
    registry: Arc<Registry>,
    context: Arc<Context>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf, registry: Arc<Registry>, context: Arc<Context>) -> Self {
        Self {
            socket_path,
            registry,
            context,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Serve until a client sends `Shutdown`
    pub async fn run(&self) -> Result<()> {
        // Remove stale socket
        let _ = fs::remove_file(&self.socket_path).await;

        let listener = UnixListener::bind(&self.socket_path)?;
        crate::log_info!("IPC server listening", {
            socket: self.socket_path.display().to_string(),
            commands: self.registry.list().len()
        });

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let shutdown_tx = Arc::new(shutdown_tx);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let registry = Arc::clone(&self.registry);
                        let context = Arc::clone(&self.context);
                        let shutdown = Arc::clone(&shutdown_tx);
                        tokio::spawn(async move {
                            if let Err(e) = handle_client(stream, registry, context, shutdown).await {
                                log::error!("Client error: {e}");
                            }
                        });
                    }
                    Err(e) => {
                        log::error!("Accept error: {e}");
                    }
                },
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        let _ = fs::remove_file(&self.socket_path).await;
        log::info!("IPC server stopped");
        Ok(())
    }
}

async fn handle_client(
    stream: UnixStream,
    registry: Arc<Registry>,
    context: Arc<Context>,
    shutdown: Arc<watch::Sender<bool>>,
) -> Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    while let Some(line) = lines.next_line().await? {
        let request: Request = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                crate::log_warn!("Malformed request, closing connection", {
                    error: e.to_string()
                });
                let error = SpoolError::ipc_protocol(&format!("Malformed request: {e}"));
                write_response(&mut writer, &Response::Error { error }).await?;
                return Ok(());
            }
        };
        log::debug!("Request: {request:?}");

        let stop = matches!(request, Request::Shutdown);
        let response = handle_request(request, &registry, &context).await;
        write_response(&mut writer, &response).await?;

        if stop {
            let _ = shutdown.send(true);
            break;
        }
    }

    Ok(())
}

async fn write_response<W: AsyncWrite + Unpin>(writer: &mut W, response: &Response) -> Result<()> {
    let response_json = serde_json::to_string(response)?;
    writer.write_all(response_json.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    Ok(())
}

/// Answer a single request. Handlers run on the blocking pool.
pub async fn handle_request(
    request: Request,
    registry: &Arc<Registry>,
    context: &Arc<Context>,
) -> Response {
    match request {
        Request::Ping => Response::Pong,

        Request::ListCommands => Response::Commands {
            commands: registry.list(),
        },

        Request::Invoke { path, args } => {
            let request_id = Uuid::new_v4().to_string();
            let joined = path.join(" ");

            let args = match dispatch::args_from_json(&args) {
                Ok(args) => args,
                Err(error) => return Response::Error { error },
            };

            let registry = Arc::clone(registry);
            let context = Arc::clone(context);
            let result = tokio::task::spawn_blocking(move || {
                dispatch::call(&registry, &path, args, &context)
                    .map(|outcome| dispatch::render(&outcome))
            })
            .await;

            match result {
                Ok(Ok(value)) => {
                    crate::log_info!("Command invoked", {
                        request_id: &request_id,
                        path: &joined
                    });
                    Response::Result { value }
                }
                Ok(Err(err)) => {
                    crate::log_error!("Command failed", err, {
                        request_id: &request_id,
                        path: &joined
                    });
                    Response::Error { error: err.into() }
                }
                Err(join_error) => Response::Error {
                    error: SpoolError::new(
                        ErrorDomain::Internal,
                        ErrorCode::INTERNAL_HANDLER_FAILED,
                        format!("Handler for '{joined}' did not complete: {join_error}"),
                    )
                    .recoverable(false),
                },
            }
        }

        Request::Shutdown => {
            log::info!("Shutdown requested");
            Response::ShuttingDown
        }
    }
}
