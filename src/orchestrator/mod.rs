//! Deployment orchestration: deploy, wait, verify, upgrade.
//!
//! Each command is a straight sequence of suspension points against the
//! [`ExecutionClient`]. A failure stops the sequence and reports the stage
//! plus any contract address that was already created; nothing is retried.
//! Explorer verification is the exception: its failures are logged and the
//! command still succeeds.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use tracing::{debug, info, warn};

use crate::config::NetworkConfig;
use crate::error::{ErrorKind, RevertReason};
use crate::logic::{
    CallOutput, LayoutError, LedgerQuery, LogicCatalog, TokenLogic, CUSTOM_TOKEN,
    CUSTOM_TOKEN_UPGRADEABLE,
};
use crate::manifest::{DeploymentManifest, ManifestError};
use crate::network::{
    ConfirmationSource, ExecutionClient, NetworkError, Operation, Receipt, Transaction, TxHash,
};
use crate::signer::{LocalSigner, SignerError};
use crate::verify::{settle, VerificationRequest, VerificationStatus, Verifier};

mod params;

pub use params::{parse_address, parse_address_list, parse_cap, TokenParams};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Stage {
    DeployToken,
    DeployLogic,
    DeployProxy,
    Upgrade,
    Confirmation,
    Lookup,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::DeployToken => "token deployment",
            Stage::DeployLogic => "logic deployment",
            Stage::DeployProxy => "proxy deployment",
            Stage::Upgrade => "upgrade",
            Stage::Confirmation => "confirmation wait",
            Stage::Lookup => "lookup",
        })
    }
}

fn orphan_note(orphan: &Option<Address>) -> String {
    match orphan {
        Some(address) => format!(" (already deployed: {address})"),
        None => String::new(),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DeployError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{logic} does not extend the recorded storage layout: {source}")]
    IncompatibleLayout {
        logic: String,
        #[source]
        source: LayoutError,
    },
    #[error("{stage} reverted: {reason}{}", orphan_note(.orphan))]
    Reverted {
        stage: Stage,
        reason: RevertReason,
        orphan: Option<Address>,
    },
    #[error("{stage} failed: {source}{}", orphan_note(.orphan))]
    Network {
        stage: Stage,
        #[source]
        source: NetworkError,
        orphan: Option<Address>,
    },
    #[error(transparent)]
    Manifest(#[from] ManifestError),
    #[error("signing failed: {0}")]
    Signing(#[from] SignerError),
}

impl DeployError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DeployError::InvalidInput(_)
            | DeployError::IncompatibleLayout { .. }
            | DeployError::Manifest(_)
            | DeployError::Signing(_) => ErrorKind::InvalidInput,
            DeployError::Reverted { reason, .. } => reason.kind,
            DeployError::Network { .. } => ErrorKind::NetworkFailure,
        }
    }

    /// Contract created before the failing stage, if any.
    pub fn orphan(&self) -> Option<Address> {
        match self {
            DeployError::Reverted { orphan, .. } | DeployError::Network { orphan, .. } => *orphan,
            _ => None,
        }
    }
}

pub type Verification = Vec<(Address, VerificationStatus)>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenDeployment {
    pub address: Address,
    pub tx_hash: TxHash,
    pub verification: Verification,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProxyDeployment {
    pub proxy: Address,
    pub implementation: Address,
    pub tx_hash: TxHash,
    pub verification: Verification,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpgradeOutcome {
    pub proxy: Address,
    pub previous_implementation: Address,
    pub implementation: Address,
    pub tx_hash: TxHash,
    pub verification: Verification,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TokenSummary {
    pub address: Address,
    pub name: String,
    pub symbol: String,
    pub decimals: u64,
    pub cap: U256,
    pub total_supply: U256,
    pub paused: bool,
    pub version: u64,
    /// Set when `address` is a proxy.
    pub implementation: Option<Address>,
}

pub struct Orchestrator {
    config: NetworkConfig,
    client: Arc<dyn ExecutionClient>,
    confirmations: Arc<dyn ConfirmationSource>,
    verifier: Option<Arc<dyn Verifier>>,
    signer: LocalSigner,
    catalog: LogicCatalog,
}

impl Orchestrator {
    pub fn new(
        config: NetworkConfig,
        client: Arc<dyn ExecutionClient>,
        confirmations: Arc<dyn ConfirmationSource>,
        signer: LocalSigner,
    ) -> Self {
        Self {
            config,
            client,
            confirmations,
            verifier: None,
            signer,
            catalog: LogicCatalog::builtin(),
        }
    }

    pub fn with_verifier(mut self, verifier: Arc<dyn Verifier>) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub fn with_catalog(mut self, catalog: LogicCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Signing account; becomes the admin of every token it deploys.
    pub fn deployer(&self) -> Address {
        self.signer.address()
    }

    pub async fn deploy_token(&self, params: &TokenParams) -> Result<TokenDeployment, DeployError> {
        let logic = self.logic(CUSTOM_TOKEN)?;
        let args = params.init_args(self.deployer());
        let mut manifest = self.load_manifest()?;

        info!(network = %self.config.name, name = %args.name, symbol = %args.symbol, cap = %args.cap, "deploying token");
        let receipt = self
            .send(
                Stage::DeployToken,
                Operation::DeployToken {
                    logic: logic.id().to_string(),
                    args: args.clone(),
                },
                None,
            )
            .await?;
        let address = created(&receipt, Stage::DeployToken, None)?;
        manifest.record_token(address, logic.id(), receipt.tx_hash);
        self.save_manifest(&manifest)?;
        info!(%address, tx_hash = %receipt.tx_hash, "token deployed");

        let request =
            VerificationRequest::for_logic(address, logic.as_ref()).with_constructor_args(args);
        let verification = self.finalize(receipt.tx_hash, address, vec![request]).await?;
        Ok(TokenDeployment {
            address,
            tx_hash: receipt.tx_hash,
            verification,
        })
    }

    /// Deploys upgradeable logic, then a proxy initialized through it.
    pub async fn deploy_proxy_token(&self, params: &TokenParams) -> Result<ProxyDeployment, DeployError> {
        let logic = self.logic(CUSTOM_TOKEN_UPGRADEABLE)?;
        let args = params.init_args(self.deployer());
        let mut manifest = self.load_manifest()?;

        info!(network = %self.config.name, logic = logic.id(), "deploying logic");
        let logic_receipt = self
            .send(
                Stage::DeployLogic,
                Operation::DeployLogic {
                    logic: logic.id().to_string(),
                },
                None,
            )
            .await?;
        let implementation = created(&logic_receipt, Stage::DeployLogic, None)?;
        manifest.record_implementation(implementation, logic.as_ref(), logic_receipt.tx_hash);
        self.save_manifest(&manifest)?;

        info!(%implementation, name = %args.name, symbol = %args.symbol, cap = %args.cap, "deploying proxy");
        let proxy_receipt = self
            .send(
                Stage::DeployProxy,
                Operation::DeployProxy {
                    implementation,
                    init: Some(args),
                },
                Some(implementation),
            )
            .await?;
        let proxy = created(&proxy_receipt, Stage::DeployProxy, Some(implementation))?;
        manifest.record_proxy(proxy, implementation, proxy_receipt.tx_hash);
        self.save_manifest(&manifest)?;
        info!(%proxy, %implementation, "proxy deployed");

        let requests = vec![
            VerificationRequest::for_proxy(proxy),
            VerificationRequest::for_logic(implementation, logic.as_ref()),
        ];
        let verification = self.finalize(proxy_receipt.tx_hash, proxy, requests).await?;
        Ok(ProxyDeployment {
            proxy,
            implementation,
            tx_hash: proxy_receipt.tx_hash,
            verification,
        })
    }

    /// Swaps the logic behind `proxy` for a fresh deployment of `new_logic`.
    /// Refused before any transaction when the manifest does not know the
    /// proxy, disagrees with the chain, or the new layout is incompatible.
    pub async fn upgrade(&self, proxy: Address, new_logic: &str) -> Result<UpgradeOutcome, DeployError> {
        let next = self.logic(new_logic)?;
        if !next.upgradeable() {
            return Err(DeployError::InvalidInput(format!(
                "{new_logic} cannot sit behind a proxy"
            )));
        }
        let mut manifest = self.load_manifest()?;
        let (recorded, record) = manifest.implementation_of(proxy).ok_or_else(|| {
            DeployError::InvalidInput(format!(
                "proxy {proxy} is not recorded in the {} manifest",
                self.config.name
            ))
        })?;
        let previous_layout = record.layout.clone();

        let onchain = self
            .client
            .implementation(proxy)
            .await
            .map_err(|source| DeployError::Network {
                stage: Stage::Lookup,
                source,
                orphan: None,
            })?;
        if onchain != recorded {
            return Err(DeployError::InvalidInput(format!(
                "manifest records implementation {recorded} for proxy {proxy} but the chain reports {onchain}"
            )));
        }
        next.layout()
            .check_extends(&previous_layout)
            .map_err(|source| DeployError::IncompatibleLayout {
                logic: new_logic.to_string(),
                source,
            })?;

        info!(%proxy, from = %recorded, logic = next.id(), "deploying new logic");
        let logic_receipt = self
            .send(
                Stage::DeployLogic,
                Operation::DeployLogic {
                    logic: next.id().to_string(),
                },
                None,
            )
            .await?;
        let implementation = created(&logic_receipt, Stage::DeployLogic, None)?;
        manifest.record_implementation(implementation, next.as_ref(), logic_receipt.tx_hash);
        self.save_manifest(&manifest)?;

        let receipt = self
            .send(
                Stage::Upgrade,
                Operation::Upgrade {
                    proxy,
                    implementation,
                    setup: None,
                },
                Some(implementation),
            )
            .await?;
        manifest.record_upgrade(proxy, implementation);
        self.save_manifest(&manifest)?;
        info!(%proxy, %implementation, "proxy upgraded");

        let request = VerificationRequest::for_logic(implementation, next.as_ref());
        let verification = self
            .finalize(receipt.tx_hash, implementation, vec![request])
            .await?;
        Ok(UpgradeOutcome {
            proxy,
            previous_implementation: recorded,
            implementation,
            tx_hash: receipt.tx_hash,
            verification,
        })
    }

    pub async fn inspect(&self, address: Address) -> Result<TokenSummary, DeployError> {
        let implementation = match self.client.implementation(address).await {
            Ok(implementation) => Some(implementation),
            Err(NetworkError::NotAProxy(_)) => None,
            Err(source) => return Err(lookup_failed(source)),
        };
        Ok(TokenSummary {
            address,
            name: self.read_text(address, LedgerQuery::Name).await?,
            symbol: self.read_text(address, LedgerQuery::Symbol).await?,
            decimals: self.read_number(address, LedgerQuery::Decimals).await?,
            cap: self.read_amount(address, LedgerQuery::Cap).await?,
            total_supply: self.read_amount(address, LedgerQuery::TotalSupply).await?,
            paused: self.read_flag(address, LedgerQuery::Paused).await?,
            version: self.read_number(address, LedgerQuery::Version).await?,
            implementation,
        })
    }

    /// Polls until `tx` has the configured number of confirmations. There is
    /// no timeout.
    pub async fn wait_for_confirmations(&self, tx: TxHash, subject: Address) -> Result<u64, DeployError> {
        let target = self.config.confirmations;
        info!(%tx, target, "waiting for confirmations");
        loop {
            let seen = self
                .confirmations
                .confirmations(tx)
                .await
                .map_err(|source| DeployError::Network {
                    stage: Stage::Confirmation,
                    source,
                    orphan: Some(subject),
                })?;
            if seen >= target {
                debug!(%tx, seen, "confirmed");
                return Ok(seen);
            }
            debug!(%tx, seen, target, "not yet confirmed");
            tokio::time::sleep(self.config.poll_interval()).await;
        }
    }

    fn logic(&self, id: &str) -> Result<Arc<dyn TokenLogic>, DeployError> {
        self.catalog
            .resolve(id)
            .ok_or_else(|| {
                let known: Vec<_> = self.catalog.ids().collect();
                DeployError::InvalidInput(format!(
                    "unknown logic `{id}` (known: {})",
                    known.join(", ")
                ))
            })
    }

    fn load_manifest(&self) -> Result<DeploymentManifest, DeployError> {
        Ok(DeploymentManifest::load(&self.config.manifest, &self.config.name)?)
    }

    fn save_manifest(&self, manifest: &DeploymentManifest) -> Result<(), DeployError> {
        manifest.save(&self.config.manifest)?;
        debug!(path = %self.config.manifest.display(), "manifest saved");
        Ok(())
    }

    async fn send(
        &self,
        stage: Stage,
        operation: Operation,
        orphan: Option<Address>,
    ) -> Result<Receipt, DeployError> {
        let from = self.deployer();
        let network = |source| DeployError::Network {
            stage,
            source,
            orphan,
        };
        let nonce = self.client.nonce(from).await.map_err(network)?;
        let signed = self.signer.sign(Transaction {
            from,
            nonce,
            operation,
        })?;
        let receipt = self.client.submit(signed).await.map_err(network)?;
        debug!(%stage, tx_hash = %receipt.tx_hash, block = receipt.block_number, "transaction included");
        receipt.into_result().map_err(|reason| {
            warn!(%stage, %reason, "transaction reverted");
            DeployError::Reverted {
                stage,
                reason,
                orphan,
            }
        })
    }

    /// Confirmation wait followed by verification of each request. Both are
    /// skipped on networks with verification disabled.
    async fn finalize(
        &self,
        tx: TxHash,
        subject: Address,
        requests: Vec<VerificationRequest>,
    ) -> Result<Verification, DeployError> {
        if !self.config.verify {
            debug!(network = %self.config.name, "local network, skipping confirmations and verification");
            return Ok(Vec::new());
        }
        self.wait_for_confirmations(tx, subject).await?;
        let mut outcomes = Vec::with_capacity(requests.len());
        for request in requests {
            let status = self.verify(&request).await;
            outcomes.push((request.address, status));
        }
        Ok(outcomes)
    }

    async fn verify(&self, request: &VerificationRequest) -> VerificationStatus {
        let status = match &self.verifier {
            Some(verifier) => settle(verifier.verify(request).await),
            None => VerificationStatus::Failed("no verifier configured".into()),
        };
        match &status {
            VerificationStatus::Failed(reason) => {
                warn!(address = %request.address, contract = %request.contract, %reason, "verification failed")
            }
            ok => info!(address = %request.address, contract = %request.contract, status = %ok, "verification done"),
        }
        status
    }

    async fn read(&self, address: Address, query: LedgerQuery) -> Result<CallOutput, DeployError> {
        self.client
            .query(address, query)
            .await
            .map_err(lookup_failed)
    }

    async fn read_text(&self, address: Address, query: LedgerQuery) -> Result<String, DeployError> {
        match self.read(address, query.clone()).await? {
            CallOutput::Text(text) => Ok(text),
            other => Err(unexpected(&query, &other)),
        }
    }

    async fn read_amount(&self, address: Address, query: LedgerQuery) -> Result<U256, DeployError> {
        match self.read(address, query.clone()).await? {
            CallOutput::Amount(amount) => Ok(amount),
            other => Err(unexpected(&query, &other)),
        }
    }

    async fn read_flag(&self, address: Address, query: LedgerQuery) -> Result<bool, DeployError> {
        match self.read(address, query.clone()).await? {
            CallOutput::Flag(flag) => Ok(flag),
            other => Err(unexpected(&query, &other)),
        }
    }

    async fn read_number(&self, address: Address, query: LedgerQuery) -> Result<u64, DeployError> {
        match self.read(address, query.clone()).await? {
            CallOutput::Number(n) => Ok(n),
            other => Err(unexpected(&query, &other)),
        }
    }
}

fn created(receipt: &Receipt, stage: Stage, orphan: Option<Address>) -> Result<Address, DeployError> {
    receipt.contract_address.ok_or_else(|| DeployError::Network {
        stage,
        source: NetworkError::Transport(format!(
            "receipt {} carries no contract address",
            receipt.tx_hash
        )),
        orphan,
    })
}

fn lookup_failed(source: NetworkError) -> DeployError {
    DeployError::Network {
        stage: Stage::Lookup,
        source,
        orphan: None,
    }
}

fn unexpected(query: &LedgerQuery, output: &CallOutput) -> DeployError {
    lookup_failed(NetworkError::UnexpectedOutput {
        query: format!("{query:?}"),
        output: output.to_string(),
    })
}
