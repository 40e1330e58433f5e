use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use teloxide::prelude::*;
use teloxide::types::{BusinessConnection, ChatKind, MessageKind};
use tracing::{debug, error, info};
use tracing_subscriber::prelude::*;

use secretary::autoreply::{
    birthday, Admin, ConnectionInfo, ConnectionRegistry, Database, InboundMessage, Messenger, Secretary,
    SecretaryConfig, TelegramClient,
};
use secretary::config::Config;
use secretary::filter::ContentFilter;
use secretary::llm::{GroqClient, LlmClient};
use secretary::monitor;
use secretary::ratelimit::DailyCounter;
use secretary::telegram_log::TelegramLogLayer;

struct BotState {
    config: Config,
    secretary: Secretary,
    admin: Admin,
    telegram: TelegramClient,
    connections: Arc<ConnectionRegistry>,
    counter: Arc<DailyCounter>,
}

impl BotState {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.config.timezone).date_naive()
    }

    fn count_update(&self) {
        self.counter.record(self.today());
    }
}

#[tokio::main]
async fn main() {
    let config_path = std::env::args().nth(1).unwrap_or_else(|| ".env".to_string());
    let config = match Config::load(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error ({config_path}): {e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.bot_token);

    // Setup logging
    let log_dir = config.data_dir.join("logs");
    std::fs::create_dir_all(&log_dir).ok();
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_dir.join("secretary.log"))
        .expect("Failed to open log file");
    let (non_blocking, _guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .with(TelegramLogLayer::new(bot.clone(), config.log_chat_id))
        .init();

    info!("🚀 Starting secretary...");
    info!("Loaded config from {config_path}");
    info!("Owner ID: {}, timezone: {}", config.owner_id, config.timezone);

    let database = match Database::open(&config.db_path) {
        Ok(db) => Arc::new(db),
        Err(e) => {
            error!("Failed to open database {}: {e}", config.db_path.display());
            std::process::exit(1);
        }
    };

    let telegram = TelegramClient::new(bot.clone());
    let messenger: Arc<dyn Messenger> = Arc::new(telegram.clone());
    let llm: Arc<dyn LlmClient> = Arc::new(GroqClient::new(
        config.groq_api_key.clone(),
        config.groq_base_url.clone(),
        config.chat_model.clone(),
        config.json_model.clone(),
    ));
    let connections = Arc::new(ConnectionRegistry::new());
    let counter = Arc::new(DailyCounter::new(Utc::now().with_timezone(&config.timezone).date_naive()));

    let secretary = Secretary::new(
        SecretaryConfig {
            owner_id: config.owner_id,
            owner_name: config.owner_name.clone(),
            log_chat_id: config.log_chat_id,
            timezone: config.timezone,
            history_limit: config.history_limit,
            reply_signature: config.reply_signature.clone(),
        },
        database.clone(),
        messenger.clone(),
        llm.clone(),
        ContentFilter::new(config.block_patterns.clone()),
        connections.clone(),
    );
    let admin = Admin::new(database.clone(), counter.clone(), config.timezone, config.owner_id);

    {
        let messenger = messenger.clone();
        let owner_id = config.owner_id;
        let start = config.groq_key_start_date.clone();
        let today = Utc::now().with_timezone(&config.timezone).date_naive();
        tokio::spawn(async move {
            monitor::check_api_key(messenger.as_ref(), owner_id, start.as_deref(), today).await;
        });
    }
    birthday::spawn_scheduler(database.clone(), messenger.clone(), llm.clone(), config.owner_id, config.timezone);

    let state = Arc::new(BotState { config, secretary, admin, telegram, connections, counter });

    let handler = dptree::entry()
        .branch(Update::filter_business_connection().endpoint(handle_business_connection))
        .branch(Update::filter_business_message().endpoint(handle_business_message))
        .branch(Update::filter_edited_business_message().endpoint(handle_edited_business_message))
        .branch(Update::filter_message().endpoint(handle_direct_message))
        .branch(Update::filter_callback_query().endpoint(handle_callback_query));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .default_handler(|upd| async move {
            debug!("Unhandled update: {:?}", upd.kind);
        })
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn business_connection_id(msg: &Message) -> Option<String> {
    match &msg.kind {
        MessageKind::Common(common) => common.business_connection_id.as_ref().map(|id| id.0.clone()),
        _ => None,
    }
}

fn to_inbound(msg: &Message, is_edited: bool) -> Option<InboundMessage> {
    let user = msg.from.as_ref()?;
    Some(InboundMessage {
        sender_id: user.id.0 as i64,
        sender_first_name: user.first_name.clone(),
        chat_id: msg.chat.id.0,
        connection_id: business_connection_id(msg).unwrap_or_default(),
        text: msg.text().or_else(|| msg.caption()).unwrap_or("").to_string(),
        message_id: msg.id.0 as i64,
        is_edited,
    })
}

async fn handle_business_connection(conn: BusinessConnection, state: Arc<BotState>) -> ResponseResult<()> {
    state.count_update();
    info!(
        "🔗 Business connection {} (chat {}): {}",
        conn.id.0,
        conn.user_chat_id.0,
        if conn.is_enabled { "enabled" } else { "disabled" }
    );
    state.connections.update(
        &conn.id.0,
        ConnectionInfo { user_chat_id: conn.user_chat_id.0 as i64, enabled: conn.is_enabled },
    );
    Ok(())
}

async fn handle_business_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    state.count_update();
    if let Some(inbound) = to_inbound(&msg, false) {
        let outcome = state.secretary.handle(inbound).await;
        debug!("Business message {} → {:?}", msg.id, outcome);
    }
    Ok(())
}

async fn handle_edited_business_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    state.count_update();
    if let Some(inbound) = to_inbound(&msg, true) {
        state.secretary.handle(inbound).await;
    }
    Ok(())
}

async fn handle_direct_message(msg: Message, state: Arc<BotState>) -> ResponseResult<()> {
    state.count_update();
    if !matches!(msg.chat.kind, ChatKind::Private(_)) {
        return Ok(());
    }
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if !state.config.is_owner(user.id.0 as i64) {
        debug!("Ignoring DM from non-owner {}", user.id);
        return Ok(());
    }
    let Some(text) = msg.text() else {
        return Ok(());
    };

    info!("📨 Owner DM: {}", text.chars().take(50).collect::<String>());
    state.admin.on_owner_message(&state.telegram, msg.chat.id.0, text).await;
    Ok(())
}

async fn handle_callback_query(query: CallbackQuery, state: Arc<BotState>) -> ResponseResult<()> {
    state.count_update();
    state.admin.on_callback(&state.telegram, &query).await;
    Ok(())
}
