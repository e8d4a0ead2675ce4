use std::future::Future;

use tracing::info;

use super::{Page, PageContext, Toast};
use crate::backend::{
    model::{
        DexStatus, ExchangeConfig, LoginResult, NewWalletForm, RegisterForm, RegisterResult,
        WalletId,
    },
    BackendError,
};
use crate::command::{CommandBridge, PendingCommand};
use crate::error::Error;

/// Onboarding step of the DEX client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DexState {
    Uninitialized,
    LoggedOut,
    LoggedIn,
    ExchangeSelected(ExchangeConfig),
    Registered { host: String },
}

#[derive(Debug)]
enum DexOutcome {
    Status(DexStatus),
    Initialized,
    LoggedIn(LoginResult),
    ConfigFetched(ExchangeConfig),
    WalletCreated(String),
    WalletUnlocked(WalletId),
    Registered { host: String, res: RegisterResult },
}

/// DEX onboarding. Runs one backend command at a time.
pub struct DexPage {
    ctx: PageContext,
    bridge: CommandBridge,
    state: DexState,
    pending: Option<PendingCommand<DexOutcome>>,
}

impl DexPage {
    pub fn new(ctx: PageContext) -> Self {
        let bridge = ctx.bridge();
        Self {
            ctx,
            bridge,
            state: DexState::Uninitialized,
            pending: None,
        }
    }

    pub fn state(&self) -> &DexState {
        &self.state
    }

    pub fn is_busy(&self) -> bool {
        self.pending.is_some()
    }

    fn run<F>(&mut self, label: &'static str, op: F) -> Result<(), Error>
    where
        F: Future<Output = Result<DexOutcome, BackendError>> + Send + 'static,
    {
        if let Some(pending) = &self.pending {
            return Err(Error::Busy(pending.label()));
        }
        self.pending = Some(self.bridge.run(label, op));
        Ok(())
    }

    pub fn initialize(&mut self, app_password: &str) -> Result<(), Error> {
        let backend = self.ctx.backend.clone();
        let password = app_password.to_string();
        self.run("client initialization", async move {
            backend.initialize_client(&password).await?;
            Ok(DexOutcome::Initialized)
        })
    }

    pub fn login(&mut self, app_password: &str) -> Result<(), Error> {
        let backend = self.ctx.backend.clone();
        let password = app_password.to_string();
        self.run("login", async move {
            backend.login(&password).await.map(DexOutcome::LoggedIn)
        })
    }

    /// Fetch the configuration of the exchange at `address`, with its TLS
    /// certificate if the user provided one.
    pub fn select_exchange(&mut self, address: &str, cert: Option<Vec<u8>>) -> Result<(), Error> {
        let backend = self.ctx.backend.clone();
        let address = address.to_string();
        self.run("exchange config fetch", async move {
            backend
                .fetch_remote_config(&address, cert.as_deref())
                .await
                .map(DexOutcome::ConfigFetched)
        })
    }

    pub fn create_wallet(&mut self, form: NewWalletForm) -> Result<(), Error> {
        let backend = self.ctx.backend.clone();
        self.run("wallet creation", async move {
            backend.create_wallet(&form).await?;
            Ok(DexOutcome::WalletCreated(form.asset))
        })
    }

    pub fn unlock_wallet(&mut self, wallet_id: WalletId, passphrase: &str) -> Result<(), Error> {
        let backend = self.ctx.backend.clone();
        let passphrase = passphrase.to_string();
        self.run("wallet unlock", async move {
            backend.unlock_wallet(wallet_id, &passphrase).await?;
            Ok(DexOutcome::WalletUnlocked(wallet_id))
        })
    }

    /// Register with the selected exchange, paying the fee it advertised.
    pub fn register(&mut self, app_password: &str, cert: Option<Vec<u8>>) -> Result<(), Error> {
        let config = match &self.state {
            DexState::ExchangeSelected(config) => config.clone(),
            _ => return Err(Error::NoExchangeSelected),
        };
        let backend = self.ctx.backend.clone();
        let form = RegisterForm {
            address: config.host,
            cert,
            app_password: app_password.to_string(),
            fee: config.fee,
        };
        self.run("registration", async move {
            let res = backend.register(&form).await?;
            Ok(DexOutcome::Registered {
                host: form.address,
                res,
            })
        })
    }

    fn apply(&mut self, outcome: DexOutcome) -> Option<Toast> {
        match outcome {
            DexOutcome::Status(status) => {
                self.state = if !status.initialized {
                    DexState::Uninitialized
                } else if status.logged_in {
                    DexState::LoggedIn
                } else {
                    DexState::LoggedOut
                };
                None
            }
            DexOutcome::Initialized => {
                self.state = DexState::LoggedIn;
                Some(Toast::Success("DEX client initialized".to_string()))
            }
            DexOutcome::LoggedIn(res) => {
                self.state = match res.exchanges.into_iter().next() {
                    Some(host) => DexState::Registered { host },
                    None => DexState::LoggedIn,
                };
                Some(Toast::Success("Logged in".to_string()))
            }
            DexOutcome::ConfigFetched(config) => {
                info!("Exchange {} charges {} {}", config.host, config.fee, config.fee_asset);
                self.state = DexState::ExchangeSelected(config);
                None
            }
            DexOutcome::WalletCreated(asset) => {
                Some(Toast::Success(format!("{} wallet created", asset)))
            }
            DexOutcome::WalletUnlocked(wallet_id) => {
                Some(Toast::Success(format!("Wallet {} unlocked", wallet_id)))
            }
            DexOutcome::Registered { host, res } => {
                self.state = DexState::Registered { host };
                Some(Toast::Success(format!(
                    "Registration fee paid in {}, waiting for {} confirmations",
                    res.fee_coin_id, res.required_confirmations
                )))
            }
        }
    }
}

impl Page for DexPage {
    fn id(&self) -> &'static str {
        "dex"
    }

    /// Look up the client status unless a command is already pending, its
    /// outcome will tell where onboarding stands.
    fn on_navigated_to(&mut self) {
        if self.pending.is_some()
            || !matches!(self.state, DexState::Uninitialized | DexState::LoggedOut)
        {
            return;
        }
        let backend = self.ctx.backend.clone();
        let res = self.run("client status check", async move {
            backend.dex_status().await.map(DexOutcome::Status)
        });
        if let Err(e) = res {
            info!("{}", e);
        }
    }

    fn handle_frame(&mut self) -> Vec<Toast> {
        let res = match self.pending.as_mut().and_then(|cmd| cmd.try_recv()) {
            Some(res) => res,
            None => return Vec::new(),
        };
        self.pending = None;
        self.ctx.redraw.request();
        match res {
            Ok(outcome) => self.apply(outcome).into_iter().collect(),
            Err(e) => vec![e.into()],
        }
    }

    // Commands keep running while the page is hidden, their outcome is shown
    // when the user comes back.
    fn on_navigated_from(&mut self) {}
}
