//! Telegram front-end: commands, the dispatcher and error reports.

use std::sync::Arc;

use futures::future::BoxFuture;
use teloxide::{
    dispatching::{DefaultKey, UpdateFilterExt, UpdateHandler},
    dptree,
    error_handlers::ErrorHandler,
    payloads::SendMessageSetters,
    prelude::Dispatcher,
    requests::Requester,
    types::{ChatId, Message, ParseMode, Recipient, Update},
    utils::{command::BotCommands, html},
    Bot,
};
use tracing::{error, warn};

use crate::{
    built_info,
    message::{Deliver, TEXT_LIMIT},
    utils::{error_chain, truncate_chars},
    Error,
};

#[derive(Debug, BotCommands, Clone)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum TelegramCommand {
    #[command(description = "show the id of this chat.")]
    Start,
    #[command(description = "display this text.")]
    Help,
}

/// Sends error reports to the bot admins.
pub struct ErrorReporter<D = Bot> {
    pub bot: D,
    pub admins: Vec<Recipient>,
}

impl<D: Deliver> ErrorReporter<D> {
    pub fn new(bot: D, admins: Vec<Recipient>) -> Self {
        Self { bot, admins }
    }

    /// Log `error` and send it to every admin.
    pub async fn report(&self, subject: &str, error: &Error, update: Option<&Update>) {
        error!("{subject}: {}", error_chain(error));

        let text = report_text(subject, error, update);
        for admin in &self.admins {
            if let Err(send_error) = self.bot.deliver_text(admin.clone(), text.clone()).await {
                warn!("failed to send error report to {admin:?}: {send_error:?}");
            }
        }
    }

    /// Report the error of `result` if any, so the handler itself succeeds.
    pub async fn check(&self, result: Result<(), Error>, update: &Update) -> Result<(), Error> {
        if let Err(error) = result {
            self.report("Failed to handle update", &error, Some(update))
                .await;
        }
        Ok(())
    }
}

impl<D: Deliver + 'static> ErrorHandler<Error> for ErrorReporter<D> {
    fn handle_error(self: Arc<Self>, error: Error) -> BoxFuture<'static, ()> {
        Box::pin(async move { self.report("Dispatcher error", &error, None).await })
    }
}

/// Html error report, at most [`TEXT_LIMIT`] characters long.
pub fn report_text(subject: &str, error: &Error, update: Option<&Update>) -> String {
    let head = format!(
        "<b>{}</b>\nnewsfeed {} ({})\n",
        html::escape(subject),
        built_info::PKG_VERSION,
        built_info::TARGET
    );

    let mut body = error_chain(error);
    if let Some(update) = update {
        let update = serde_json::to_string_pretty(update)
            .unwrap_or_else(|error| format!("unserializable update: {error}"));
        body.push_str("\n\nupdate: ");
        body.push_str(&update);
    }

    let budget = TEXT_LIMIT.saturating_sub(head.chars().count() + "<pre></pre>".len());
    format!("{head}<pre>{}</pre>", escape_within(&body, budget))
}

/// Escape `text`, cutting it so the result has at most `limit` characters.
fn escape_within(text: &str, limit: usize) -> String {
    let mut len = text.chars().count();
    loop {
        let escaped = html::escape(&truncate_chars(text, len));
        let overflow = escaped.chars().count().saturating_sub(limit);
        if overflow == 0 || len == 0 {
            return escaped;
        }
        len = len.saturating_sub(overflow.div_ceil(5));
    }
}

fn chat_id_text(chat_id: ChatId) -> String {
    format!(
        "Ваш <b>chat_id = {chat_id}</b>.\nДля получения уведомлений передайте его администратору бота."
    )
}

pub fn dispatcher(bot: Bot, reporter: Arc<ErrorReporter>) -> Dispatcher<Bot, Error, DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![reporter.clone()])
        .error_handler(reporter)
        .default_handler(|_| async {})
        .enable_ctrlc_handler()
        .build()
}

pub fn schema() -> UpdateHandler<Error> {
    let command_handler = teloxide::filter_command::<TelegramCommand, _>()
        .branch(dptree::case![TelegramCommand::Start].endpoint(start))
        .branch(dptree::case![TelegramCommand::Help].endpoint(help));

    Update::filter_message().branch(command_handler)
}

async fn start(
    bot: Bot,
    msg: Message,
    update: Update,
    reporter: Arc<ErrorReporter>,
) -> crate::Result<()> {
    let result = bot
        .send_message(msg.chat.id, chat_id_text(msg.chat.id))
        .parse_mode(ParseMode::Html)
        .await
        .map(|_| ())
        .map_err(Error::from);
    reporter.check(result, &update).await
}

async fn help(
    bot: Bot,
    msg: Message,
    update: Update,
    reporter: Arc<ErrorReporter>,
) -> crate::Result<()> {
    let text = TelegramCommand::descriptions();
    let result = bot
        .send_message(msg.chat.id, html::escape(&text.to_string()))
        .parse_mode(ParseMode::Html)
        .await
        .map(|_| ())
        .map_err(Error::from);
    reporter.check(result, &update).await
}
