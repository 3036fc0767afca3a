use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{ErrorKind, RevertReason};
use crate::ledger::{LedgerEvent, LedgerState};
use crate::logic::{CallOutput, LedgerCall, LedgerQuery, LogicCatalog, TokenLogic};
use crate::persist::write_atomic;
use crate::proxy::UpgradeProxy;
use crate::signer::verify_transaction;

use super::{
    contract_address, ConfirmationSource, ExecutionClient, ExecutionStatus, NetworkError,
    Operation, Receipt, SignedTransaction, TxHash,
};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContractAccount {
    Logic { logic: String },
    Token { logic: String, storage: LedgerState },
    Proxy { proxy: UpgradeProxy },
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChainState {
    head: u64,
    nonces: BTreeMap<Address, u64>,
    accounts: BTreeMap<Address, ContractAccount>,
    receipts: BTreeMap<TxHash, Receipt>,
}

type Outcome = Result<(Option<Address>, Vec<LedgerEvent>), RevertReason>;

/// Single-node development chain. Every accepted transaction is mined into
/// its own block. With a state file the chain survives across invocations.
pub struct DevChain {
    catalog: LogicCatalog,
    state: Mutex<ChainState>,
    path: Option<PathBuf>,
}

impl DevChain {
    pub fn in_memory(catalog: LogicCatalog) -> Self {
        Self {
            catalog,
            state: Mutex::new(ChainState::default()),
            path: None,
        }
    }

    pub fn open(path: impl Into<PathBuf>, catalog: LogicCatalog) -> Result<Self, NetworkError> {
        let path = path.into();
        let state = if path.exists() {
            let bytes = fs::read(&path)?;
            serde_json::from_slice(&bytes)?
        } else {
            ChainState::default()
        };
        debug!(path = %path.display(), head = state.head, "opened dev chain");
        Ok(Self {
            catalog,
            state: Mutex::new(state),
            path: Some(path),
        })
    }

    pub async fn head(&self) -> u64 {
        self.state.lock().await.head
    }

    /// Appends `blocks` empty blocks.
    pub async fn mine(&self, blocks: u64) -> Result<u64, NetworkError> {
        let mut state = self.state.lock().await;
        state.head += blocks;
        self.persist(&state)?;
        Ok(state.head)
    }

    fn persist(&self, state: &ChainState) -> Result<(), NetworkError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        write_atomic(path, &serde_json::to_vec_pretty(state)?)?;
        Ok(())
    }

    fn resolve(&self, id: &str) -> Result<Arc<dyn TokenLogic>, RevertReason> {
        self.catalog
            .resolve(id)
            .ok_or_else(|| RevertReason::new(ErrorKind::InvalidInput, format!("unknown logic {id}")))
    }

    fn logic_at(&self, state: &ChainState, address: Address) -> Result<Arc<dyn TokenLogic>, RevertReason> {
        match state.accounts.get(&address) {
            Some(ContractAccount::Logic { logic }) => self.resolve(logic),
            _ => Err(RevertReason::new(
                ErrorKind::InvalidInput,
                format!("no logic contract at {address}"),
            )),
        }
    }

    fn execute(&self, state: &mut ChainState, from: Address, nonce: u64, operation: &Operation) -> Outcome {
        match operation {
            Operation::DeployLogic { logic } => {
                self.resolve(logic)?;
                let address = contract_address(from, nonce);
                state.accounts.insert(
                    address,
                    ContractAccount::Logic {
                        logic: logic.clone(),
                    },
                );
                Ok((Some(address), Vec::new()))
            }
            Operation::DeployToken { logic, args } => {
                let code = self.resolve(logic)?;
                let mut storage = LedgerState::new();
                code.execute(&mut storage, from, &LedgerCall::Initialize(args.clone()))
                    .map_err(|err| err.revert_reason())?;
                let events = storage.take_events();
                let address = contract_address(from, nonce);
                state.accounts.insert(
                    address,
                    ContractAccount::Token {
                        logic: logic.clone(),
                        storage,
                    },
                );
                Ok((Some(address), events))
            }
            Operation::DeployProxy {
                implementation,
                init,
            } => {
                let code = self.logic_at(state, *implementation)?;
                if !code.upgradeable() {
                    return Err(RevertReason::new(
                        ErrorKind::InvalidInput,
                        format!("{} cannot sit behind a proxy", code.id()),
                    ));
                }
                let mut proxy = UpgradeProxy::deploy(*implementation);
                if let Some(args) = init {
                    proxy
                        .initialize(code.as_ref(), from, args.clone())
                        .map_err(|err| err.revert_reason())?;
                }
                let events = proxy.take_events();
                let address = contract_address(from, nonce);
                state
                    .accounts
                    .insert(address, ContractAccount::Proxy { proxy });
                Ok((Some(address), events))
            }
            Operation::Call { to, call } => {
                let mut account = state.accounts.get(to).cloned().ok_or_else(|| {
                    RevertReason::new(ErrorKind::InvalidInput, format!("no contract at {to}"))
                })?;
                let events = match &mut account {
                    ContractAccount::Token { logic, storage } => {
                        let code = self.resolve(logic)?;
                        code.execute(storage, from, call)
                            .map_err(|err| err.revert_reason())?;
                        storage.take_events()
                    }
                    ContractAccount::Proxy { proxy } => {
                        let code = self.logic_at(state, proxy.implementation())?;
                        proxy
                            .forward(code.as_ref(), from, call)
                            .map_err(|err| err.revert_reason())?;
                        proxy.take_events()
                    }
                    ContractAccount::Logic { logic } => {
                        return Err(RevertReason::new(
                            ErrorKind::InvalidInput,
                            format!("{logic} at {to} holds no token state"),
                        ))
                    }
                };
                state.accounts.insert(*to, account);
                Ok((None, events))
            }
            Operation::Upgrade {
                proxy,
                implementation,
                setup,
            } => {
                let mut account = state.accounts.get(proxy).cloned();
                let Some(ContractAccount::Proxy { proxy: inner }) = account.as_mut() else {
                    return Err(RevertReason::new(
                        ErrorKind::InvalidInput,
                        format!("{proxy} is not a proxy"),
                    ));
                };
                let current = self.logic_at(state, inner.implementation())?;
                let next = self.logic_at(state, *implementation)?;
                if !next.upgradeable() {
                    return Err(RevertReason::new(
                        ErrorKind::InvalidInput,
                        format!("{} cannot sit behind a proxy", next.id()),
                    ));
                }
                inner
                    .upgrade(current.as_ref(), from, *implementation, next.as_ref(), setup.as_ref())
                    .map_err(|err| err.revert_reason())?;
                let events = inner.take_events();
                if let Some(account) = account {
                    state.accounts.insert(*proxy, account);
                }
                Ok((None, events))
            }
        }
    }
}

#[async_trait]
impl ExecutionClient for DevChain {
    fn name(&self) -> &str {
        "dev"
    }

    async fn nonce(&self, account: Address) -> Result<u64, NetworkError> {
        Ok(self
            .state
            .lock()
            .await
            .nonces
            .get(&account)
            .copied()
            .unwrap_or(0))
    }

    async fn submit(&self, signed: SignedTransaction) -> Result<Receipt, NetworkError> {
        let from = verify_transaction(&signed)?;
        let tx_hash = signed.tx.hash()?;

        let mut state = self.state.lock().await;
        let expected = state.nonces.get(&from).copied().unwrap_or(0);
        if signed.tx.nonce != expected {
            return Err(NetworkError::Rejected(format!(
                "nonce {} does not match expected {expected}",
                signed.tx.nonce
            )));
        }
        state.nonces.insert(from, expected + 1);
        state.head += 1;
        let block_number = state.head;

        let (status, contract_address, events) =
            match self.execute(&mut state, from, expected, &signed.tx.operation) {
                Ok((address, events)) => (ExecutionStatus::Success, address, events),
                Err(reason) => {
                    info!(%tx_hash, %reason, "transaction reverted");
                    (ExecutionStatus::Reverted(reason), None, Vec::new())
                }
            };
        let receipt = Receipt {
            tx_hash,
            block_number,
            from,
            status,
            contract_address,
            events,
        };
        state.receipts.insert(tx_hash, receipt.clone());
        self.persist(&state)?;
        debug!(%tx_hash, block_number, "mined transaction");
        Ok(receipt)
    }

    async fn query(&self, to: Address, query: LedgerQuery) -> Result<CallOutput, NetworkError> {
        let state = self.state.lock().await;
        match state.accounts.get(&to) {
            Some(ContractAccount::Token { logic, storage }) => {
                let code = self
                    .catalog
                    .resolve(logic)
                    .ok_or(NetworkError::NotAToken(to))?;
                Ok(code.query(storage, &query))
            }
            Some(ContractAccount::Proxy { proxy }) => {
                let code = self
                    .logic_at(&state, proxy.implementation())
                    .map_err(|_| NetworkError::NotAToken(to))?;
                Ok(proxy.query(code.as_ref(), &query))
            }
            _ => Err(NetworkError::NotAToken(to)),
        }
    }

    async fn implementation(&self, proxy: Address) -> Result<Address, NetworkError> {
        match self.state.lock().await.accounts.get(&proxy) {
            Some(ContractAccount::Proxy { proxy: inner }) => Ok(inner.implementation()),
            _ => Err(NetworkError::NotAProxy(proxy)),
        }
    }
}

#[async_trait]
impl ConfirmationSource for DevChain {
    async fn confirmations(&self, tx: TxHash) -> Result<u64, NetworkError> {
        let state = self.state.lock().await;
        let receipt = state
            .receipts
            .get(&tx)
            .ok_or(NetworkError::UnknownTransaction(tx))?;
        Ok(state.head.saturating_sub(receipt.block_number) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use alloy_primitives::U256;

    use crate::ledger::InitArgs;
    use crate::logic::{CUSTOM_TOKEN, CUSTOM_TOKEN_FINAL, CUSTOM_TOKEN_UPGRADEABLE};
    use crate::network::Transaction;
    use crate::signer::LocalSigner;

    struct Harness {
        chain: DevChain,
        admin: LocalSigner,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                chain: DevChain::in_memory(LogicCatalog::builtin()),
                admin: LocalSigner::from_bytes(&[7u8; 32]),
            }
        }

        async fn send_as(&self, signer: &LocalSigner, operation: Operation) -> Receipt {
            let nonce = self.chain.nonce(signer.address()).await.unwrap();
            let tx = Transaction {
                from: signer.address(),
                nonce,
                operation,
            };
            self.chain.submit(signer.sign(tx).unwrap()).await.unwrap()
        }

        async fn send(&self, operation: Operation) -> Receipt {
            self.send_as(&self.admin, operation).await
        }

        fn args(&self, cap: u64) -> InitArgs {
            InitArgs {
                name: "Custom Token".into(),
                symbol: "CTK".into(),
                cap: U256::from(cap),
                admin: self.admin.address(),
                minters: vec![self.admin.address()],
                pausers: vec![],
            }
        }

        async fn deploy_proxy(&self) -> (Address, Address) {
            let logic = self
                .send(Operation::DeployLogic {
                    logic: CUSTOM_TOKEN_UPGRADEABLE.into(),
                })
                .await
                .contract_address
                .unwrap();
            let proxy = self
                .send(Operation::DeployProxy {
                    implementation: logic,
                    init: Some(self.args(1_000)),
                })
                .await
                .contract_address
                .unwrap();
            (proxy, logic)
        }
    }

    #[tokio::test]
    async fn standalone_token_is_initialized_by_constructor() {
        let h = Harness::new();
        let receipt = h
            .send(Operation::DeployToken {
                logic: CUSTOM_TOKEN.into(),
                args: h.args(1_000),
            })
            .await;
        assert!(receipt.is_success());
        let token = receipt.contract_address.unwrap();
        assert_eq!(
            h.chain.query(token, LedgerQuery::Cap).await.unwrap(),
            CallOutput::Amount(U256::from(1_000u64))
        );
        assert!(matches!(
            h.chain.implementation(token).await,
            Err(NetworkError::NotAProxy(_))
        ));
    }

    #[tokio::test]
    async fn reverted_call_keeps_state_and_consumes_nonce() {
        let h = Harness::new();
        let (proxy, _) = h.deploy_proxy().await;
        let receipt = h
            .send(Operation::Call {
                to: proxy,
                call: LedgerCall::Mint {
                    to: h.admin.address(),
                    amount: U256::from(1_001u64),
                },
            })
            .await;
        let reason = receipt.into_result().unwrap_err();
        assert_eq!(reason.kind, ErrorKind::CapExceeded);
        assert_eq!(reason.reason, "ERC20: cap exceeded");
        assert_eq!(
            h.chain.query(proxy, LedgerQuery::TotalSupply).await.unwrap(),
            CallOutput::Amount(U256::ZERO)
        );
        assert_eq!(h.chain.nonce(h.admin.address()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn proxy_upgrade_swaps_logic_and_keeps_balances() {
        let h = Harness::new();
        let (proxy, v1) = h.deploy_proxy().await;
        h.send(Operation::Call {
            to: proxy,
            call: LedgerCall::Mint {
                to: h.admin.address(),
                amount: U256::from(250u64),
            },
        })
        .await;
        let v2 = h
            .send(Operation::DeployLogic {
                logic: CUSTOM_TOKEN_FINAL.into(),
            })
            .await
            .contract_address
            .unwrap();

        let outsider = LocalSigner::from_bytes(&[9u8; 32]);
        let denied = h
            .send_as(
                &outsider,
                Operation::Upgrade {
                    proxy,
                    implementation: v2,
                    setup: None,
                },
            )
            .await;
        assert_eq!(denied.into_result().unwrap_err().kind, ErrorKind::Unauthorized);
        assert_eq!(h.chain.implementation(proxy).await.unwrap(), v1);

        let receipt = h
            .send(Operation::Upgrade {
                proxy,
                implementation: v2,
                setup: None,
            })
            .await;
        assert!(receipt.is_success());
        assert_eq!(receipt.events, vec![LedgerEvent::Upgraded { implementation: v2 }]);
        assert_eq!(h.chain.implementation(proxy).await.unwrap(), v2);
        assert_eq!(
            h.chain
                .query(
                    proxy,
                    LedgerQuery::BalanceOf {
                        account: h.admin.address()
                    }
                )
                .await
                .unwrap(),
            CallOutput::Amount(U256::from(250u64))
        );
        assert_eq!(
            h.chain.query(proxy, LedgerQuery::Version).await.unwrap(),
            CallOutput::Number(2)
        );
    }

    #[tokio::test]
    async fn non_upgradeable_logic_cannot_back_a_proxy() {
        let h = Harness::new();
        let logic = h
            .send(Operation::DeployLogic {
                logic: CUSTOM_TOKEN.into(),
            })
            .await
            .contract_address
            .unwrap();
        let receipt = h
            .send(Operation::DeployProxy {
                implementation: logic,
                init: None,
            })
            .await;
        assert_eq!(receipt.into_result().unwrap_err().kind, ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn stale_nonce_and_bad_signature_are_rejected() {
        let h = Harness::new();
        let tx = Transaction {
            from: h.admin.address(),
            nonce: 5,
            operation: Operation::DeployLogic {
                logic: CUSTOM_TOKEN_UPGRADEABLE.into(),
            },
        };
        let err = h.chain.submit(h.admin.sign(tx.clone()).unwrap()).await.unwrap_err();
        assert!(matches!(err, NetworkError::Rejected(_)));

        let mut forged = h.admin.sign(Transaction { nonce: 0, ..tx }).unwrap();
        forged.signature[0] ^= 0xff;
        assert!(matches!(
            h.chain.submit(forged).await,
            Err(NetworkError::Rejected(_))
        ));
        assert_eq!(h.chain.head().await, 0);
    }

    #[tokio::test]
    async fn confirmations_grow_with_mined_blocks() {
        let h = Harness::new();
        let receipt = h
            .send(Operation::DeployLogic {
                logic: CUSTOM_TOKEN_UPGRADEABLE.into(),
            })
            .await;
        assert_eq!(h.chain.confirmations(receipt.tx_hash).await.unwrap(), 1);
        h.chain.mine(5).await.unwrap();
        assert_eq!(h.chain.confirmations(receipt.tx_hash).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn state_file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("chain").join("dev.json");
        let admin = LocalSigner::from_bytes(&[7u8; 32]);

        let proxy = {
            let chain = DevChain::open(&path, LogicCatalog::builtin()).unwrap();
            let h = Harness { chain, admin };
            h.deploy_proxy().await.0
        };

        let chain = DevChain::open(&path, LogicCatalog::builtin()).unwrap();
        assert_eq!(chain.head().await, 2);
        assert_eq!(
            chain.query(proxy, LedgerQuery::Name).await.unwrap(),
            CallOutput::Text("Custom Token".into())
        );
    }
}
