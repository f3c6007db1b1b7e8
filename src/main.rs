use std::{process, sync::Arc};

use scoped_settings::{
    application::{
        context::RenderContext,
        error::{AppError, SettingsError},
        repos::{SettingStore, SiteResolver},
        service::{ResolveOptions, SettingsService},
    },
    config::{self, Command, ResolveArgs},
    domain::{keys::FieldPath, sites::RequestInfo},
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        memory::{InMemorySettingStore, StaticSiteResolver},
        telemetry,
    },
};
use serde_json::{Map, Value, json};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt()
        .with_max_level(Level::ERROR)
        .with_writer(std::io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli().map_err(InfraError::from)?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::List => run_list(&settings),
        Command::Resolve(args) => run_resolve(&settings, args).await,
    }
}

fn run_list(settings: &config::Settings) -> Result<(), AppError> {
    let types: Vec<Value> = settings
        .registry
        .iter()
        .map(|setting| {
            json!({
                "key": setting.key().to_string(),
                "namespace": setting.namespace(),
                "type_name": setting.type_name(),
                "scope": setting.scope(),
                "label": setting.label(),
                "defaults": setting.defaults(),
            })
        })
        .collect();
    print_json(&Value::Array(types))
}

async fn run_resolve(settings: &config::Settings, args: ResolveArgs) -> Result<(), AppError> {
    let (store, sites) = init_backends(settings).await?;
    let service = SettingsService::new(Arc::clone(&settings.registry), store, sites);
    let options = ResolveOptions {
        use_default_tenant: args.default_site,
    };

    let request = args.host.as_deref().map(|host| {
        let info = match args.port {
            Some(port) => RequestInfo::new(host, port),
            None => RequestInfo::from_host(host),
        };
        service.begin_request(info)
    });
    let request_summary = request.as_ref().map(|scope| {
        json!({
            "id": scope.id(),
            "hostname": scope.request().hostname(),
            "port": scope.request().port(),
        })
    });

    let context = service.render_context(request);
    let mut resolved = Map::new();
    for key in &args.keys {
        let value = resolve_key(&service, &context, key, options).await?;
        resolved.insert(key.clone(), value);
    }
    info!(
        context = %context.id(),
        keys = args.keys.len(),
        cached = context.cached_len(),
        "resolved settings"
    );
    drop(context);

    print_json(&json!({
        "request": request_summary,
        "default_site": args.default_site,
        "settings": resolved,
    }))
}

/// Plain keys resolve to the whole instance; keys unknown as a type but
/// shaped like `namespace.Type.field` resolve to one field value.
async fn resolve_key(
    service: &SettingsService,
    context: &RenderContext,
    key: &str,
    options: ResolveOptions,
) -> Result<Value, AppError> {
    match service.lookup(key) {
        Ok(setting) => {
            let instance = service.resolve_type(&setting, context, options).await?;
            Ok(json!({
                "id": instance.id(),
                "scope": instance.scope(),
                "data": &instance.record().data,
            }))
        }
        Err(SettingsError::UnknownSetting { .. }) if FieldPath::parse(key).is_ok() => {
            Ok(service.resolve_field(key, context, options).await?)
        }
        Err(err) => Err(err.into()),
    }
}

async fn init_backends(
    settings: &config::Settings,
) -> Result<(Arc<dyn SettingStore>, Arc<dyn SiteResolver>), AppError> {
    let Some(database_url) = settings.database.url.as_ref() else {
        info!(sites = settings.sites.len(), "using in-memory settings store");
        let store: Arc<dyn SettingStore> = Arc::new(InMemorySettingStore::new());
        let sites: Arc<dyn SiteResolver> = Arc::new(StaticSiteResolver::new(settings.sites.clone()));
        return Ok((store, sites));
    };

    let repositories = Arc::new(
        PostgresRepositories::open(database_url, settings.database.max_connections).await?,
    );
    for site in &settings.sites {
        repositories
            .upsert_site(site)
            .await
            .map_err(InfraError::from)?;
    }
    info!(sites = settings.sites.len(), "using postgres settings store");

    let store: Arc<dyn SettingStore> = repositories.clone();
    let sites: Arc<dyn SiteResolver> = repositories;
    Ok((store, sites))
}

fn print_json(value: &Value) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value).map_err(InfraError::from)?;
    println!("{rendered}");
    Ok(())
}
