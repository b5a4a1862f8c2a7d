//! 터미널 브리지 단일 소유 액터.
//!
//! 전용 OS 스레드가 [`TerminalBridge`]를 소유하고, 비동기 호출 측은
//! `mpsc` 채널로 요청을 보내 `oneshot`으로 응답을 받습니다. 호출 측에서는
//! 락을 잡지 않으며 터미널 호출은 항상 한 번에 하나씩 실행됩니다.

use std::collections::HashSet;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info};

use super::bridge::{TerminalBridge, TerminalError, TerminalRate};

/// 요청 큐 크기.
const COMMAND_BUFFER: usize = 64;

/// 봉 조회 방식.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateQuery {
    Range {
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    },
    Latest {
        count: u32,
    },
}

struct RateCommand {
    symbol: String,
    timeframe_code: u32,
    query: RateQuery,
    reply: oneshot::Sender<Result<Vec<TerminalRate>, TerminalError>>,
}

/// 터미널 액터 핸들. 복제해서 여러 작업 단위가 공유합니다.
///
/// 마지막 핸들이 drop되면 채널이 닫히고 브리지 스레드가 종료됩니다.
#[derive(Clone)]
pub struct TerminalHandle {
    tx: mpsc::Sender<RateCommand>,
}

impl TerminalHandle {
    /// 브리지 스레드 시작.
    ///
    /// `connect`는 새 스레드 안에서 실행되어 브리지를 생성합니다. 생성에
    /// 실패하면 그 에러를 반환합니다.
    pub async fn spawn<B, F>(connect: F) -> Result<(Self, JoinHandle<()>), TerminalError>
    where
        B: TerminalBridge,
        F: FnOnce() -> Result<B, TerminalError> + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let (ready_tx, ready_rx) = oneshot::channel();

        let join = std::thread::Builder::new()
            .name("terminal-bridge".to_string())
            .spawn(move || match connect() {
                Ok(bridge) => {
                    let _ = ready_tx.send(Ok(()));
                    run_bridge(bridge, rx);
                }
                Err(e) => {
                    let _ = ready_tx.send(Err(e));
                }
            })
            .map_err(|e| TerminalError::NotConnected(e.to_string()))?;

        ready_rx.await.map_err(|_| TerminalError::Disconnected)??;
        info!("터미널 브리지 스레드 시작");

        Ok((Self { tx }, join))
    }

    /// 봉 조회 요청.
    pub async fn fetch_rates(
        &self,
        symbol: &str,
        timeframe_code: u32,
        query: RateQuery,
    ) -> Result<Vec<TerminalRate>, TerminalError> {
        let (reply, response) = oneshot::channel();

        self.tx
            .send(RateCommand {
                symbol: symbol.to_string(),
                timeframe_code,
                query,
                reply,
            })
            .await
            .map_err(|_| TerminalError::Disconnected)?;

        response.await.map_err(|_| TerminalError::Disconnected)?
    }
}

fn run_bridge<B: TerminalBridge>(mut bridge: B, mut rx: mpsc::Receiver<RateCommand>) {
    let mut selected: HashSet<String> = HashSet::new();

    while let Some(command) = rx.blocking_recv() {
        let result = execute(&mut bridge, &mut selected, &command);
        if let Err(e) = &result {
            error!(symbol = %command.symbol, error = %e, "터미널 봉 조회 실패");
        }
        // 호출 측이 타임아웃으로 먼저 포기했을 수 있음
        let _ = command.reply.send(result);
    }

    debug!("터미널 브리지 스레드 종료");
}

fn execute<B: TerminalBridge>(
    bridge: &mut B,
    selected: &mut HashSet<String>,
    command: &RateCommand,
) -> Result<Vec<TerminalRate>, TerminalError> {
    if !selected.contains(&command.symbol) {
        bridge.select_symbol(&command.symbol)?;
        selected.insert(command.symbol.clone());
    }

    match command.query {
        RateQuery::Range { from, to } => {
            bridge.copy_rates_range(&command.symbol, command.timeframe_code, from, to)
        }
        RateQuery::Latest { count } => {
            bridge.copy_rates_from_pos(&command.symbol, command.timeframe_code, 0, count)
        }
    }
}
