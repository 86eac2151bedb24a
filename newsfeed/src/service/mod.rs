//! Service module
//!
//! While the [`crate::client`] module is responsible for talking to the
//! newsfeed server, this service layer runs the update cycle: it compares the
//! server listing with the seen id history, notifies subscribers about every
//! new news using [`Notifier`], and advances the history.

pub mod update;

use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::{
    client::NewsSource,
    database::{SeenIdStore, SeenIds},
    message::{Deliver, DeliveryReport, DownloadedFile, NewsMessage, Notifier},
    resource::{Attachment, NewsId},
    Error,
};

pub use update::{CycleReport, ItemDelivery, ItemOutcome};

/// Central service of the bot, owning everything one update cycle needs.
pub struct NewsfeedService<C, D> {
    pub client: C,
    pub store: SeenIdStore,
    pub notifier: Notifier<D>,
    pub download_dir: PathBuf,
    pub page: u32,
}

impl<C, D> NewsfeedService<C, D>
where
    C: NewsSource,
    D: Deliver,
{
    /// Run one update cycle.
    ///
    /// The history only advances past news that were processed successfully,
    /// so a failed news is tried again on the next cycle. An error is returned
    /// only when the cycle could not run at all.
    pub async fn check_for_updates(&self) -> Result<CycleReport, Error> {
        let current = self.client.list_news_ids(self.page).await?;
        debug!("fetched ids {current:?}");
        if current.len() > self.store.limit() {
            warn!(
                "listing has {} ids but history keeps {}, older ids will look new again",
                current.len(),
                self.store.limit()
            );
        }

        let Some(previous) = self.store.load().await? else {
            let baseline = SeenIds::bounded(current, self.store.limit());
            let baseline = self.store.save(&baseline).await?;
            info!(
                "no history at {}, saved {} ids as baseline",
                self.store.path().display(),
                baseline.len()
            );
            return Ok(CycleReport::Bootstrapped { baseline });
        };
        debug!("previous ids {:?}", previous.ids());

        let new_ids = update::new_ids(&current, &previous);
        if new_ids.is_empty() {
            debug!("no new news");
            return Ok(CycleReport::Checked {
                outcomes: vec![],
                saved: previous,
            });
        }
        info!("new news {new_ids:?}");

        let mut outcomes = Vec::with_capacity(new_ids.len());
        for id in new_ids {
            let result = self.work(id).await;
            if let Err(error) = &result {
                warn!("failed to process news {id}, will retry next cycle: {error:?}");
            }
            outcomes.push(ItemOutcome { id, result });
        }

        let succeeded = outcomes
            .iter()
            .filter(|outcome| outcome.is_success())
            .map(|outcome| outcome.id);
        let history = previous.extended(succeeded, self.store.limit());
        let saved = self.store.save(&history).await?;

        Ok(CycleReport::Checked { outcomes, saved })
    }

    /// Fetch one news, notify subscribers about it and mark it as read.
    ///
    /// Every attachment gets its own notification. Read marks are only sent
    /// after the notifications went out; failing to send one is not fatal.
    pub async fn work(&self, id: NewsId) -> Result<ItemDelivery, Error> {
        let news = self.client.get_news_detail(id).await?;
        info!("news {id} published at {}: {}", news.publish_at, news.title);

        let message = NewsMessage::new(&self.notifier.header, &news);
        let mut delivery = ItemDelivery::default();

        if news.attachments.is_empty() {
            self.deliver(id, &message, None).await?;
            delivery.notifications += 1;
        }

        for attachment in &news.attachments {
            let file = DownloadedFile::new(self.download_dir.join(file_name(attachment)));
            self.client
                .download_attachment(id, attachment, file.path())
                .await?;
            self.deliver(id, &message, Some(file)).await?;
            delivery.notifications += 1;
        }

        match self.client.mark_read(id).await {
            Ok(()) => delivery.marked_read = true,
            Err(error) => warn!("failed to mark news {id} as read: {error:?}"),
        }

        Ok(delivery)
    }

    async fn deliver(
        &self,
        id: NewsId,
        message: &NewsMessage,
        attachment: Option<DownloadedFile>,
    ) -> Result<DeliveryReport, Error> {
        let report = self.notifier.notify(message, attachment).await;
        if report.is_undelivered() {
            return Err(Error::Undelivered(id));
        }
        Ok(report)
    }
}

/// Local file name of an attachment, without any directory part.
fn file_name(attachment: &Attachment) -> String {
    let name = attachment
        .file_full_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    match name {
        "" | "." | ".." => attachment.guid.clone(),
        name => name.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        path::Path,
        sync::Mutex,
    };

    use async_trait::async_trait;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    use super::*;
    use crate::{
        database::HISTORY_LIMIT,
        message::tests::{chats, FakeBot},
        resource::NewsItem,
    };

    #[derive(Default)]
    struct FakeSource {
        ids: Mutex<HashSet<NewsId>>,
        details: HashMap<NewsId, NewsItem>,
        broken: Mutex<HashSet<NewsId>>,
        list_broken: bool,
        mark_read_broken: bool,
        requested: Mutex<Vec<NewsId>>,
        marked: Mutex<Vec<NewsId>>,
        downloaded: Mutex<Vec<PathBuf>>,
    }

    impl FakeSource {
        fn with(ids: &[i64]) -> Self {
            let mut source = Self::default();
            for id in ids {
                source.publish(news(*id, vec![]));
            }
            source
        }

        fn publish(&mut self, news: NewsItem) {
            self.ids.lock().unwrap().insert(news.id);
            self.details.insert(news.id, news);
        }

        fn requested(&self) -> Vec<NewsId> {
            self.requested.lock().unwrap().clone()
        }

        fn marked(&self) -> Vec<NewsId> {
            self.marked.lock().unwrap().clone()
        }
    }

    fn io_error(message: &str) -> Error {
        Error::IOError(std::io::Error::new(std::io::ErrorKind::Other, message.to_owned()))
    }

    #[async_trait]
    impl NewsSource for FakeSource {
        async fn list_news_ids(&self, page: u32) -> Result<HashSet<NewsId>, Error> {
            assert_eq!(page, 1);
            if self.list_broken {
                return Err(io_error("502 Bad Gateway"));
            }
            Ok(self.ids.lock().unwrap().clone())
        }

        async fn get_news_detail(&self, id: NewsId) -> Result<NewsItem, Error> {
            self.requested.lock().unwrap().push(id);
            if self.broken.lock().unwrap().contains(&id) {
                return Err(io_error("500 Internal Server Error"));
            }
            Ok(self.details[&id].clone())
        }

        async fn download_attachment(
            &self,
            _id: NewsId,
            attachment: &Attachment,
            dest: &Path,
        ) -> Result<PathBuf, Error> {
            std::fs::write(dest, attachment.guid.as_bytes())?;
            self.downloaded.lock().unwrap().push(dest.to_path_buf());
            Ok(dest.to_path_buf())
        }

        async fn mark_read(&self, id: NewsId) -> Result<(), Error> {
            if self.mark_read_broken {
                return Err(io_error("419 Session Expired"));
            }
            self.marked.lock().unwrap().push(id);
            Ok(())
        }
    }

    fn news(id: i64, attachments: Vec<Attachment>) -> NewsItem {
        NewsItem {
            id: NewsId(id),
            publish_at: NaiveDate::from_ymd_opt(2024, 3, 1)
                .unwrap()
                .and_hms_opt(9, 30, 0)
                .unwrap(),
            title: format!("news {id}"),
            attachments,
        }
    }

    struct Fixture {
        dir: TempDir,
        service: NewsfeedService<FakeSource, FakeBot>,
    }

    impl Fixture {
        fn new(source: FakeSource, bot: FakeBot, history: Option<&str>) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let state_file = dir.path().join("entry.json");
            if let Some(history) = history {
                std::fs::write(&state_file, history).unwrap();
            }
            let download_dir = dir.path().join("downloads");
            std::fs::create_dir(&download_dir).unwrap();

            let service = NewsfeedService {
                client: source,
                store: SeenIdStore::new(state_file, HISTORY_LIMIT),
                notifier: Notifier {
                    bot,
                    subscribers: chats(&[1, 2, 3]),
                    header: "header".to_owned(),
                },
                download_dir,
                page: 1,
            };
            Self { dir, service }
        }

        fn history(&self) -> String {
            std::fs::read_to_string(self.dir.path().join("entry.json")).unwrap()
        }

        fn sent_titles(&self) -> Vec<String> {
            self.service
                .notifier
                .bot
                .sent()
                .into_iter()
                .map(|sent| sent.text.lines().last().unwrap_or_default().to_owned())
                .collect()
        }
    }

    #[tokio::test]
    async fn test_first_run_saves_baseline_without_sending() {
        let fixture = Fixture::new(FakeSource::with(&[5, 6]), FakeBot::default(), None);

        let report = fixture.service.check_for_updates().await.unwrap();

        assert!(matches!(report, CycleReport::Bootstrapped { .. }));
        assert!(fixture.service.notifier.bot.sent().is_empty());
        assert!(fixture.service.client.requested().is_empty());
        assert_eq!(fixture.history(), "[6,5]");
    }

    #[tokio::test]
    async fn test_first_run_baseline_keeps_largest_ids() {
        let fixture = Fixture::new(
            FakeSource::with(&(1..=40).collect::<Vec<_>>()),
            FakeBot::default(),
            None,
        );

        let report = fixture.service.check_for_updates().await.unwrap();

        let saved: Vec<i64> = serde_json::from_str(&fixture.history()).unwrap();
        assert_eq!(saved, (11..=40).rev().collect::<Vec<_>>());
        assert_eq!(report.saved().len(), HISTORY_LIMIT);
        assert!(fixture.service.notifier.bot.sent().is_empty());
    }

    #[tokio::test]
    async fn test_new_news_is_sent_marked_and_saved() {
        let fixture = Fixture::new(
            FakeSource::with(&[101, 102, 103]),
            FakeBot::default(),
            Some("[101, 102]"),
        );

        let report = fixture.service.check_for_updates().await.unwrap();

        assert_eq!(report.succeeded().collect::<Vec<_>>(), vec![NewsId(103)]);
        assert_eq!(fixture.service.client.requested(), vec![NewsId(103)]);
        assert_eq!(fixture.sent_titles(), vec!["news 103"; 3]);
        assert_eq!(fixture.service.client.marked(), vec![NewsId(103)]);
        assert_eq!(fixture.history(), "[103,102,101]");
    }

    #[tokio::test]
    async fn test_nothing_new_sends_nothing() {
        let fixture = Fixture::new(FakeSource::with(&[5, 6]), FakeBot::default(), None);

        fixture.service.check_for_updates().await.unwrap();
        let history = fixture.history();
        for _ in 0..2 {
            let report = fixture.service.check_for_updates().await.unwrap();
            assert!(report.outcomes().is_empty());
        }

        assert!(fixture.service.notifier.bot.sent().is_empty());
        assert!(fixture.service.client.marked().is_empty());
        assert_eq!(fixture.history(), history);
    }

    #[tokio::test]
    async fn test_news_are_processed_in_ascending_order() {
        let fixture = Fixture::new(FakeSource::with(&[1, 40, 7, 12]), FakeBot::default(), Some("[1]"));

        fixture.service.check_for_updates().await.unwrap();

        assert_eq!(
            fixture.service.client.requested(),
            vec![NewsId(7), NewsId(12), NewsId(40)]
        );
        assert_eq!(
            fixture.service.client.marked(),
            vec![NewsId(7), NewsId(12), NewsId(40)]
        );
    }

    #[tokio::test]
    async fn test_failed_news_is_retried_next_cycle() {
        let source = FakeSource::with(&[1, 2, 3]);
        source.broken.lock().unwrap().insert(NewsId(2));
        let fixture = Fixture::new(source, FakeBot::default(), Some("[]"));

        let report = fixture.service.check_for_updates().await.unwrap();

        assert_eq!(
            report.failures().map(|(id, _)| id).collect::<Vec<_>>(),
            vec![NewsId(2)]
        );
        assert_eq!(
            fixture.sent_titles(),
            [vec!["news 1"; 3], vec!["news 3"; 3]].concat()
        );
        assert_eq!(fixture.service.client.marked(), vec![NewsId(1), NewsId(3)]);
        assert_eq!(fixture.history(), "[3,1]");

        fixture.service.client.broken.lock().unwrap().clear();
        let report = fixture.service.check_for_updates().await.unwrap();

        assert_eq!(report.succeeded().collect::<Vec<_>>(), vec![NewsId(2)]);
        assert_eq!(fixture.history(), "[3,2,1]");
    }

    #[tokio::test]
    async fn test_failing_subscriber_still_advances_history() {
        let fixture = Fixture::new(
            FakeSource::with(&[10, 11]),
            FakeBot::failing(chats(&[2])),
            Some("[10]"),
        );

        let report = fixture.service.check_for_updates().await.unwrap();

        let recipients: Vec<_> = fixture
            .service
            .notifier
            .bot
            .sent()
            .into_iter()
            .map(|sent| sent.recipient)
            .collect();
        assert_eq!(recipients, [chats(&[1]), chats(&[3])].concat());
        assert_eq!(report.succeeded().collect::<Vec<_>>(), vec![NewsId(11)]);
        assert_eq!(fixture.history(), "[11,10]");
    }

    #[tokio::test]
    async fn test_undelivered_news_is_not_marked_nor_saved() {
        let fixture = Fixture::new(
            FakeSource::with(&[10, 11]),
            FakeBot::failing(chats(&[1, 2, 3])),
            Some("[10]"),
        );

        let report = fixture.service.check_for_updates().await.unwrap();

        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert!(matches!(failures[0], (NewsId(11), Error::Undelivered(NewsId(11)))));
        assert!(fixture.service.client.marked().is_empty());
        assert_eq!(fixture.history(), "[10]");
    }

    #[tokio::test]
    async fn test_mark_read_failure_is_not_fatal() {
        let mut source = FakeSource::with(&[10, 11]);
        source.mark_read_broken = true;
        let fixture = Fixture::new(source, FakeBot::default(), Some("[10]"));

        let report = fixture.service.check_for_updates().await.unwrap();

        let outcome = &report.outcomes()[0];
        assert_eq!(
            outcome.result.as_ref().unwrap(),
            &ItemDelivery {
                notifications: 1,
                marked_read: false
            }
        );
        assert_eq!(fixture.history(), "[11,10]");
    }

    #[tokio::test]
    async fn test_every_attachment_is_sent_and_removed() {
        let mut source = FakeSource::with(&[1]);
        source.publish(news(
            2,
            vec![
                Attachment {
                    guid: "a1".to_owned(),
                    file_full_name: "Приказ № 12.pdf".to_owned(),
                },
                Attachment {
                    guid: "a2".to_owned(),
                    file_full_name: "../../etc/график.xlsx".to_owned(),
                },
            ],
        ));
        let fixture = Fixture::new(source, FakeBot::default(), Some("[1]"));

        let report = fixture.service.check_for_updates().await.unwrap();

        assert_eq!(
            report.outcomes()[0].result.as_ref().unwrap().notifications,
            2
        );
        let download_dir = &fixture.service.download_dir;
        let documents: Vec<_> = fixture
            .service
            .notifier
            .bot
            .sent()
            .into_iter()
            .map(|sent| sent.document.unwrap())
            .collect();
        assert_eq!(
            documents,
            [
                vec![download_dir.join("Приказ № 12.pdf"); 3],
                vec![download_dir.join("график.xlsx"); 3],
            ]
            .concat()
        );
        assert_eq!(fixture.service.client.downloaded.lock().unwrap().len(), 2);
        assert_eq!(std::fs::read_dir(download_dir).unwrap().count(), 0);
        assert_eq!(fixture.history(), "[2,1]");
    }

    #[tokio::test]
    async fn test_history_keeps_largest_ids() {
        let history: Vec<i64> = (1..=30).collect();
        let history = serde_json::to_string(&history).unwrap();
        let fixture = Fixture::new(
            FakeSource::with(&(25..=40).collect::<Vec<_>>()),
            FakeBot::default(),
            Some(&history),
        );

        fixture.service.check_for_updates().await.unwrap();

        let saved: Vec<i64> = serde_json::from_str(&fixture.history()).unwrap();
        assert_eq!(saved, (11..=40).rev().collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_broken_listing_aborts_cycle() {
        let mut source = FakeSource::with(&[1, 2]);
        source.list_broken = true;
        let fixture = Fixture::new(source, FakeBot::default(), Some("[1]"));

        assert!(fixture.service.check_for_updates().await.is_err());
        assert_eq!(fixture.history(), "[1]");
    }

    #[tokio::test]
    async fn test_corrupted_history_aborts_cycle() {
        let fixture = Fixture::new(FakeSource::with(&[1, 2]), FakeBot::default(), Some("oops"));

        let error = fixture.service.check_for_updates().await.unwrap_err();

        assert!(matches!(error, Error::CorruptedState(..)));
        assert!(fixture.service.notifier.bot.sent().is_empty());
        assert_eq!(fixture.history(), "oops");
    }

    #[test]
    fn test_file_name() {
        let attachment = |name: &str| Attachment {
            guid: "guid".to_owned(),
            file_full_name: name.to_owned(),
        };
        assert_eq!(file_name(&attachment("plan.docx")), "plan.docx");
        assert_eq!(file_name(&attachment("a/b/plan.docx")), "plan.docx");
        assert_eq!(file_name(&attachment("C:\\docs\\plan.docx")), "plan.docx");
        assert_eq!(file_name(&attachment("dir/..")), "guid");
        assert_eq!(file_name(&attachment("")), "guid");
    }
}
