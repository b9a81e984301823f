use std::{
    io::{self, Read},
    path::Path,
    process,
    sync::Arc,
};

use entity_relay::{
    application::{
        CallerHints, DeleteOptions, EntityContext, EntityFacade, HandlerRegistry, IndexOptions,
        LoadOptions, SaveOptions, error::AppError, oneshot_callbacks,
    },
    cache::{CacheConfig, FileStore, KeyValueStore, MemoryStore},
    config::{self, CacheBackend, Command},
    domain::{Entity, EntityIdArg},
    infra::{error::InfraError, rest::RestTransport, telemetry},
};
use serde::Serialize;
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
        .with_writer(io::stderr)
        .finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()?;

    telemetry::init(&settings.logging)?;

    match cli_args.command {
        Command::Get(args) => run_get(&settings, args).await,
        Command::Index(args) => run_index(&settings, args).await,
        Command::Save(args) => run_save(&settings, args).await,
        Command::Delete(args) => run_delete(&settings, args).await,
        Command::Invalidate(args) => run_invalidate(&settings, args),
    }
}

async fn run_get(settings: &config::Settings, args: config::GetArgs) -> Result<(), AppError> {
    let facade = build_facade(settings, true)?;
    let (success, error, outcome) = oneshot_callbacks();
    facade.load(
        args.entity_type.as_str(),
        args.id.as_str(),
        LoadOptions {
            reset: args.reset,
            hints: CallerHints::default(),
            success: Some(success),
            error: Some(error),
        },
    );
    print_json(&outcome.await?)
}

async fn run_index(settings: &config::Settings, args: config::IndexArgs) -> Result<(), AppError> {
    let facade = build_facade(settings, true)?;
    let query_key = args
        .query
        .unwrap_or_else(|| format!("{}.json", args.entity_type));
    let (success, error, outcome) = oneshot_callbacks();
    facade.index(
        args.entity_type.as_str(),
        query_key,
        IndexOptions {
            reset: args.reset,
            hints: CallerHints::default(),
            success: Some(success),
            error: Some(error),
        },
    );
    print_json(&outcome.await?)
}

async fn run_save(settings: &config::Settings, args: config::SaveArgs) -> Result<(), AppError> {
    let facade = build_facade(settings, true)?;
    let entity = read_entity(&args.file)?;
    let (success, error, outcome) = oneshot_callbacks();
    facade.save(
        args.entity_type.as_str(),
        &args.bundle,
        entity,
        SaveOptions {
            success: Some(success),
            error: Some(error),
        },
    );
    print_json(&outcome.await?)
}

async fn run_delete(settings: &config::Settings, args: config::DeleteArgs) -> Result<(), AppError> {
    let facade = build_facade(settings, true)?;
    let id = EntityIdArg::from(args.id.as_str()).resolve()?;
    let (success, error, outcome) = oneshot_callbacks();
    facade.delete(
        args.entity_type.as_str(),
        id,
        DeleteOptions {
            success: Some(success),
            error: Some(error),
        },
    );
    let response = outcome.await?;
    if args.invalidate {
        facade.invalidate(args.entity_type.as_str(), id);
    }
    print_json(&response)
}

fn run_invalidate(
    settings: &config::Settings,
    args: config::InvalidateArgs,
) -> Result<(), AppError> {
    let facade = build_facade(settings, false)?;
    match (args.index, args.entity_type, args.id) {
        (Some(query_key), _, _) => {
            facade.invalidate_index(&query_key);
            info!(query_key = %query_key, "invalidated cached index");
        }
        (None, Some(entity_type), Some(id)) => {
            facade.invalidate(entity_type.as_str(), id);
            info!(entity_type = %entity_type, entity_id = id, "invalidated cached entity");
        }
        _ => {
            return Err(AppError::validation(
                "invalidate needs an entity type and id, or --index",
            ));
        }
    }
    Ok(())
}

fn build_facade(settings: &config::Settings, with_remote: bool) -> Result<EntityFacade, AppError> {
    let store: Arc<dyn KeyValueStore> = match settings.cache.backend {
        CacheBackend::Memory => Arc::new(MemoryStore::new()),
        CacheBackend::File => {
            let store = FileStore::open(settings.cache.directory.clone()).map_err(|err| {
                InfraError::configuration(format!(
                    "failed to open cache directory {}: {err}",
                    settings.cache.directory.display()
                ))
            })?;
            Arc::new(store)
        }
    };

    let mut registry = HandlerRegistry::new();
    if with_remote {
        let base_url = settings.remote.base_url.as_ref().ok_or_else(|| {
            AppError::validation(
                "remote base URL is required (use --remote-base-url or ENTITY_RELAY__REMOTE__BASE_URL)",
            )
        })?;
        let transport = Arc::new(RestTransport::new(
            base_url,
            &settings.remote.endpoint,
            settings.remote.timeout,
        )?);
        transport.register_all(
            &mut registry,
            settings
                .remote
                .entity_types
                .iter()
                .map(|(name, key)| (name.as_str(), key.as_deref())),
        );
    }

    let ctx = EntityContext::new(CacheConfig::from(&settings.cache), store, registry)
        .with_default_language(&settings.remote.default_language);
    Ok(EntityFacade::new(ctx))
}

fn read_entity(path: &Path) -> Result<Entity, AppError> {
    let text = if path == Path::new("-") {
        let mut buffer = String::new();
        io::stdin()
            .read_to_string(&mut buffer)
            .map_err(InfraError::from)?;
        buffer
    } else {
        std::fs::read_to_string(path).map_err(|err| {
            AppError::validation(format!("failed to read {}: {err}", path.display()))
        })?
    };
    let value: serde_json::Value = serde_json::from_str(&text)
        .map_err(|err| AppError::validation(format!("entity document is not JSON: {err}")))?;
    Ok(Entity::try_from(value)?)
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to render output: {err}")))?;
    println!("{text}");
    Ok(())
}
