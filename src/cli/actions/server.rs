use crate::{
    api::{
        self,
        email::{EmailSender, LogEmailSender},
        rate_limit::AdmissionGate,
        support::SupportDesk,
        AppState,
    },
    auth::{
        oauth::{OAuthConfig, OAuthProvider},
        AccountService, AuthConfig, RoleSource, TokenIssuer,
    },
    cli::telemetry,
    store::{AccountStore, CatalogStore, MemoryStore, PgStore},
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: Option<String>,
    pub jwt_secret: SecretString,
    pub token_ttl_seconds: u64,
    pub code_ttl_seconds: i64,
    pub frontend_base_url: String,
    pub role_source: RoleSource,
    pub allow_admin_registration: bool,
    pub rate_limit_capacity: u32,
    pub rate_limit_refill_per_second: f64,
    pub oauth: Option<OAuthConfig>,
    pub support_email: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, migrations fail, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let (accounts, catalog): (Arc<dyn AccountStore>, Arc<dyn CatalogStore>) = match &args.dsn {
        Some(dsn) => {
            let store = Arc::new(
                PgStore::connect(dsn)
                    .await
                    .context("Failed to connect to database")?,
            );
            info!("Connected to database, migrations applied");
            (store.clone(), store)
        }
        None => {
            warn!("No DSN configured, using the in-memory store");
            let store = Arc::new(MemoryStore::new());
            (store.clone(), store)
        }
    };

    let port = args.port;
    let state = build_state(args, accounts, catalog)?;
    let result = api::new(port, state).await;

    telemetry::shutdown_tracer();

    result
}

/// Wire the identity service, catalog, support desk and admission gate over the given stores.
///
/// # Errors
/// Returns an error if the signing key or the federated provider is unusable.
pub fn build_state(
    args: Args,
    accounts: Arc<dyn AccountStore>,
    catalog: Arc<dyn CatalogStore>,
) -> Result<AppState> {
    let tokens = Arc::new(
        TokenIssuer::new(args.jwt_secret, Duration::from_secs(args.token_ttl_seconds))
            .context("Invalid session signing key")?,
    );

    let config = AuthConfig::new(args.frontend_base_url)
        .with_code_ttl_seconds(args.code_ttl_seconds)
        .with_admin_registration(args.allow_admin_registration);

    let mailer: Arc<dyn EmailSender> = Arc::new(LogEmailSender);
    let support = Arc::new(SupportDesk::new(mailer.clone(), args.support_email));

    let mut service = AccountService::new(accounts, mailer, tokens, config);
    if let Some(oauth) = args.oauth {
        let provider = OAuthProvider::new(oauth).context("Failed to build OAuth client")?;
        service = service.with_identity_provider(Arc::new(provider));
        info!("Federated login enabled");
    }

    if args.role_source == RoleSource::Header {
        warn!("Admin gate trusts the client-supplied Role header");
    }

    Ok(AppState {
        accounts: Arc::new(service),
        catalog,
        gate: Arc::new(
            AdmissionGate::new(args.rate_limit_capacity, args.rate_limit_refill_per_second)
                .context("Invalid admission gate quota")?,
        ),
        support,
        role_source: args.role_source,
    })
}
