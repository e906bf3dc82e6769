//! Typed request/response surface
//!
//! One request per line of JSON, tagged by `op`:
//!
//! ```json
//! {"op":"add_strategies","quorum":0,"strategies":[{"strategy":"0x…","multiplier":"1000"}]}
//! {"status":"ok","reply":{"type":"index_range","value":{"start":0,"end":1}}}
//! ```
//!
//! Share amounts and multipliers travel as decimal strings so values above
//! 2^64 survive JSON.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};
use workgrid_common::crypto::MerkleProof;
use workgrid_common::types::encoding::hex_bytes;
use workgrid_common::{
    Address, ErrorKind, QuorumNumber, Result, StrategyEntry, StrategyId, StrategyParams,
    TaskCompletionRecord, TaskId, Worker, WorkerId, WorkgridError,
};

use crate::coordinator::{OperatorUpdateReport, QuorumPhase, Selection};
use crate::registry::WhitelistOutcome;
use crate::service::Workgrid;
use crate::strategy::{RestakeableScope, ShareUpdate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    AddToWhitelist {
        address: Address,
    },
    RemoveFromWhitelist {
        address: Address,
    },
    IsWhitelisted {
        address: Address,
    },
    RegisterWorker {
        address: Address,
        #[serde(default)]
        metadata_ref: String,
    },
    DeregisterWorker {
        worker_id: WorkerId,
    },
    GetWorkers,
    GetWorkerIds,
    GetWorkerById {
        worker_id: WorkerId,
    },
    CheckWorkerRegistered {
        worker_id: WorkerId,
    },
    AddStrategies {
        quorum: QuorumNumber,
        strategies: Vec<StrategyParams>,
    },
    /// Indices refer to the list before this call
    RemoveStrategies {
        quorum: QuorumNumber,
        indices: Vec<usize>,
    },
    StrategyParamsByIndex {
        quorum: QuorumNumber,
        index: usize,
    },
    GetStrategies {
        quorum: QuorumNumber,
    },
    /// `scope` wins over the `quorum` shorthand; with neither the
    /// configured scope applies
    GetRestakeableStrategies {
        #[serde(default)]
        scope: Option<RestakeableScope>,
        #[serde(default)]
        quorum: Option<QuorumNumber>,
    },
    SetOperatorShares {
        operator: Address,
        shares: Vec<ShareUpdate>,
    },
    GetOperatorShares {
        operator: Address,
        strategies: Vec<StrategyId>,
    },
    UpdateOperators {
        operators: Vec<Address>,
    },
    GetWorkerMgtAddress,
    SetWorkerMgtAddress {
        address: Address,
    },
    SelectWorkers {
        count: usize,
        #[serde(default)]
        quorum: Option<QuorumNumber>,
    },
    GetNonce,
    GetQuorumPhase {
        quorum: QuorumNumber,
    },
    OpenTask {
        task_id: TaskId,
    },
    SubmitCompletion {
        task_id: TaskId,
        submitter: WorkerId,
        #[serde(with = "hex_bytes")]
        result_payload: Vec<u8>,
    },
    SubmitFailure {
        task_id: TaskId,
        submitter: WorkerId,
        #[serde(default, with = "hex_bytes")]
        result_payload: Vec<u8>,
    },
    GetCompletedTaskById {
        task_id: TaskId,
    },
    GetTask {
        task_id: TaskId,
    },
    GetCompletionRoot,
    GetCompletionProof {
        task_id: TaskId,
    },
    Metrics,
}

/// Half-open index range assigned by `add_strategies`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Reply {
    Done,
    Whitelist(WhitelistOutcome),
    Bool(bool),
    WorkerId(WorkerId),
    WorkerIds(Vec<WorkerId>),
    Worker(Worker),
    Workers(Vec<Worker>),
    IndexRange(IndexRange),
    Strategy(StrategyEntry),
    Strategies(Vec<StrategyEntry>),
    StrategyIds(Vec<StrategyId>),
    /// Shares per requested strategy, in request order
    Shares(Vec<ShareUpdate>),
    OperatorReport(OperatorUpdateReport),
    Address(Option<Address>),
    Selection(Selection),
    Nonce(u64),
    Phase(QuorumPhase),
    Task(TaskCompletionRecord),
    /// `0x`-prefixed root, absent before the first completion
    Root(Option<String>),
    Proof(MerkleProof),
    Metrics(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { reply: Reply },
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn is_ok(&self) -> bool {
        matches!(self, Response::Ok { .. })
    }
}

impl From<Result<Reply>> for Response {
    fn from(result: Result<Reply>) -> Self {
        match result {
            Ok(reply) => Response::Ok { reply },
            Err(e) => Response::Error {
                kind: e.kind(),
                message: e.to_string(),
            },
        }
    }
}

impl Workgrid {
    /// Execute one request
    pub fn handle(&self, request: Request) -> Response {
        debug!(?request, "Handling request");
        self.dispatch(request).into()
    }

    /// Parse a JSON request line and render the JSON response
    pub fn handle_json(&self, line: &str) -> String {
        let response = match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request),
            Err(e) => Response::from(Err(WorkgridError::from(e))),
        };
        render(&response)
    }

    /// Answer newline-delimited JSON requests until the reader is exhausted
    ///
    /// Every non-blank line gets exactly one response line, including lines
    /// that are not valid UTF-8. Returns the number of lines answered.
    pub async fn serve_lines<R, W>(&self, mut reader: R, mut writer: W) -> std::io::Result<u64>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut buf = Vec::new();
        let mut handled = 0u64;

        loop {
            buf.clear();
            if reader.read_until(b'\n', &mut buf).await? == 0 {
                break;
            }
            let response = match std::str::from_utf8(&buf) {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => self.handle_json(line.trim_end()),
                Err(e) => {
                    warn!(error = %e, "Request line is not valid UTF-8");
                    render(&Response::from(Err(WorkgridError::Serialization(format!(
                        "request is not valid UTF-8: {e}"
                    )))))
                }
            };
            writer.write_all(response.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await?;
            handled += 1;
        }

        Ok(handled)
    }

    fn dispatch(&self, request: Request) -> Result<Reply> {
        Ok(match request {
            Request::AddToWhitelist { address } => Reply::Whitelist(self.add_to_whitelist(address)?),
            Request::RemoveFromWhitelist { address } => {
                Reply::Bool(self.remove_from_whitelist(address))
            }
            Request::IsWhitelisted { address } => Reply::Bool(self.is_whitelisted(&address)),
            Request::RegisterWorker {
                address,
                metadata_ref,
            } => Reply::WorkerId(self.register_worker(address, metadata_ref)?),
            Request::DeregisterWorker { worker_id } => {
                Reply::Worker(self.deregister_worker(worker_id)?)
            }
            Request::GetWorkers => Reply::Workers(self.get_workers()),
            Request::GetWorkerIds => Reply::WorkerIds(self.get_worker_ids()),
            Request::GetWorkerById { worker_id } => {
                Reply::Worker(self.get_worker_by_id(&worker_id)?)
            }
            Request::CheckWorkerRegistered { worker_id } => {
                Reply::Bool(self.check_worker_registered(&worker_id))
            }
            Request::AddStrategies { quorum, strategies } => {
                let range = self.add_strategies(quorum, strategies)?;
                Reply::IndexRange(IndexRange {
                    start: range.start,
                    end: range.end,
                })
            }
            Request::RemoveStrategies { quorum, indices } => {
                Reply::Strategies(self.remove_strategies(quorum, indices)?)
            }
            Request::StrategyParamsByIndex { quorum, index } => {
                Reply::Strategy(self.strategy_params_by_index(quorum, index)?)
            }
            Request::GetStrategies { quorum } => Reply::Strategies(self.strategies(quorum)),
            Request::GetRestakeableStrategies { scope, quorum } => Reply::StrategyIds(
                self.get_restakeable_strategies(scope.or(quorum.map(RestakeableScope::Quorum))),
            ),
            Request::SetOperatorShares { operator, shares } => {
                self.set_operator_shares(operator, shares);
                Reply::Done
            }
            Request::GetOperatorShares {
                operator,
                strategies,
            } => {
                let amounts = self.get_operator_shares(&operator, &strategies);
                Reply::Shares(
                    strategies
                        .into_iter()
                        .zip(amounts)
                        .map(|(strategy, shares)| ShareUpdate::new(strategy, shares))
                        .collect(),
                )
            }
            Request::UpdateOperators { operators } => {
                Reply::OperatorReport(self.update_operators(operators)?)
            }
            Request::GetWorkerMgtAddress => Reply::Address(self.get_worker_mgt_address()),
            Request::SetWorkerMgtAddress { address } => {
                Reply::Address(self.set_worker_mgt_address(address)?)
            }
            Request::SelectWorkers { count, quorum } => Reply::Selection(match quorum {
                Some(q) => self.select_workers_for_quorum(q, count)?,
                None => self.select_workers(count)?,
            }),
            Request::GetNonce => Reply::Nonce(self.get_nonce()),
            Request::GetQuorumPhase { quorum } => Reply::Phase(self.quorum_phase(quorum)),
            Request::OpenTask { task_id } => Reply::Task(self.open_task(task_id)?),
            Request::SubmitCompletion {
                task_id,
                submitter,
                result_payload,
            } => Reply::Task(self.submit_completion(task_id, submitter, result_payload)?),
            Request::SubmitFailure {
                task_id,
                submitter,
                result_payload,
            } => Reply::Task(self.submit_failure(task_id, submitter, result_payload)?),
            Request::GetCompletedTaskById { task_id } => {
                Reply::Task(self.get_completed_task_by_id(&task_id)?)
            }
            Request::GetTask { task_id } => Reply::Task(self.get_task(&task_id)?),
            Request::GetCompletionRoot => Reply::Root(
                self.completion_root()
                    .map(|root| format!("0x{}", hex::encode(root))),
            ),
            Request::GetCompletionProof { task_id } => {
                Reply::Proof(self.completion_proof(&task_id)?)
            }
            Request::Metrics => Reply::Metrics(self.metrics_text()?),
        })
    }
}

fn render(response: &Response) -> String {
    match serde_json::to_string(response) {
        Ok(json) => json,
        Err(e) => serde_json::json!({
            "status": "error",
            "kind": ErrorKind::Internal,
            "message": e.to_string(),
        })
        .to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_json_shape() {
        let json = r#"{"op":"add_strategies","quorum":0,"strategies":[{"strategy":"0x1111111111111111111111111111111111111111","multiplier":"1000"}]}"#;
        let request: Request = serde_json::from_str(json).unwrap();
        match request {
            Request::AddStrategies { quorum, strategies } => {
                assert_eq!(quorum, 0);
                assert_eq!(strategies[0].multiplier, 1000);
            }
            other => panic!("unexpected request {other:?}"),
        }

        let select: Request = serde_json::from_str(r#"{"op":"select_workers","count":3}"#).unwrap();
        assert_eq!(
            select,
            Request::SelectWorkers {
                count: 3,
                quorum: None
            }
        );
    }

    #[test]
    fn test_restakeable_scope_request_shape() {
        let all: Request =
            serde_json::from_str(r#"{"op":"get_restakeable_strategies","scope":"all_quorums"}"#)
                .unwrap();
        assert_eq!(
            all,
            Request::GetRestakeableStrategies {
                scope: Some(RestakeableScope::AllQuorums),
                quorum: None
            }
        );

        let one: Request =
            serde_json::from_str(r#"{"op":"get_restakeable_strategies","scope":{"quorum":2}}"#)
                .unwrap();
        assert_eq!(
            one,
            Request::GetRestakeableStrategies {
                scope: Some(RestakeableScope::Quorum(2)),
                quorum: None
            }
        );
    }

    #[test]
    fn test_error_response_shape() {
        let response = Response::from(Err(WorkgridError::Selection(
            workgrid_common::SelectionError::InvalidCount,
        )));
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["status"], "error");
        assert_eq!(json["kind"], "InvalidCount");
    }
}
