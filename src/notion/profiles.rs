use serde_json::{json, Value};
use std::time::Duration;

use crate::core::cache::ExpiringCache;
use crate::core::errors::{AppError, AppResult};
use crate::core::retry::{with_retry, RetryOptions};
use crate::domain::Profile;
use crate::notion::{
    non_empty, number, number_value, plain_text, rich_text, title, title_text, Client,
};

const PROFILE_CACHE_TTL: Duration = Duration::from_secs(300);
const PROFILE_CACHE_SIZE: usize = 1000;

/// Profiles stored in the Notion profiles database, keyed by Telegram user
/// id, with a read-through cache in front of the query endpoint.
#[derive(Debug, Clone)]
pub struct ProfilesRepo {
    client: Client,
    database_id: String,
    cache: ExpiringCache<i64, Profile>,
    retry: RetryOptions,
}

impl ProfilesRepo {
    pub fn new(client: Client, database_id: String) -> Self {
        Self {
            client,
            database_id,
            cache: ExpiringCache::new(PROFILE_CACHE_TTL, PROFILE_CACHE_SIZE),
            retry: RetryOptions::default(),
        }
    }

    pub async fn find_by_tg_id(&self, tg_id: i64) -> AppResult<Option<Profile>> {
        if let Some(profile) = self.cache.get(&tg_id).await {
            return Ok(Some(profile));
        }

        let body = json!({
            "filter": { "property": "tgId", "number": { "equals": tg_id } },
            "page_size": 1,
        });
        let response = with_retry("notion.profiles.query", &self.retry, || {
            self.client.query_database(&self.database_id, body.clone())
        })
        .await?;

        let Some(page) = response["results"].get(0) else {
            return Ok(None);
        };
        let profile = page_to_profile(page);
        self.cache.set(tg_id, profile.clone()).await;
        Ok(Some(profile))
    }

    pub async fn ensure(&self, tg_id: i64) -> AppResult<Profile> {
        self.find_by_tg_id(tg_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Анкета не найдена. Начни с /start".into()))
    }

    pub async fn upsert(&self, profile: &Profile) -> AppResult<Profile> {
        let properties = profile_properties(profile);
        let existing = self.find_by_tg_id(profile.tg_id).await?;

        let page = match existing.and_then(|stored| stored.id) {
            Some(page_id) => {
                with_retry("notion.profiles.update", &self.retry, || {
                    self.client.update_page(&page_id, properties.clone())
                })
                .await?
            }
            None => {
                with_retry("notion.profiles.create", &self.retry, || {
                    self.client.create_page(&self.database_id, properties.clone())
                })
                .await?
            }
        };

        let stored = page_to_profile(&page);
        self.cache.set(stored.tg_id, stored.clone()).await;
        Ok(stored)
    }

    pub async fn update_channel_message(&self, tg_id: i64, message_id: i64) -> AppResult<()> {
        let profile = self.ensure(tg_id).await?;
        let page_id = profile
            .id
            .ok_or_else(|| AppError::NotFound("Анкета не найдена. Начни с /start".into()))?;

        let properties = json!({ "channelMessageId": number(message_id) });
        with_retry("notion.profiles.channel_message", &self.retry, || {
            self.client.update_page(&page_id, properties.clone())
        })
        .await?;
        // Next read picks up the stored message id.
        self.cache.remove(&tg_id).await;
        Ok(())
    }
}

fn profile_properties(profile: &Profile) -> Value {
    let mut properties = json!({
        "name": title(&profile.name),
        "tgId": number(profile.tg_id),
        "city": rich_text(&profile.city),
        "country": rich_text(&profile.country),
        "intro": rich_text(&profile.intro),
        "catName": rich_text(&profile.cat_name),
        "catPhotoId": rich_text(&profile.cat_photo_id),
        "catPhotoUrl": rich_text(profile.cat_photo_url.as_deref().unwrap_or_default()),
    });
    if let Some(message_id) = profile.channel_message_id {
        properties["channelMessageId"] = number(message_id);
    }
    properties
}

fn page_to_profile(page: &Value) -> Profile {
    let props = &page["properties"];
    Profile {
        id: page["id"].as_str().map(str::to_string),
        tg_id: number_value(&props["tgId"]).unwrap_or_default(),
        name: title_text(&props["name"]),
        city: plain_text(&props["city"]),
        country: plain_text(&props["country"]),
        intro: plain_text(&props["intro"]),
        cat_name: plain_text(&props["catName"]),
        cat_photo_id: plain_text(&props["catPhotoId"]),
        cat_photo_url: non_empty(plain_text(&props["catPhotoUrl"])),
        channel_message_id: number_value(&props["channelMessageId"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::NotionConfig;

    fn repo(base_url: &str) -> ProfilesRepo {
        let client = Client::new(&NotionConfig {
            token: "secret".into(),
            base_url: base_url.into(),
            db_profiles: "db-profiles".into(),
            db_listings: "db-listings".into(),
        })
        .unwrap();
        let mut repo = ProfilesRepo::new(client, "db-profiles".into());
        repo.retry = RetryOptions {
            initial_delay: Duration::from_millis(5),
            ..RetryOptions::default()
        };
        repo
    }

    fn page_body() -> String {
        json!({
            "results": [{
                "id": "page-1",
                "properties": {
                    "tgId": { "number": 7 },
                    "name": { "title": [{ "plain_text": "Ада" }] },
                    "city": { "rich_text": [{ "plain_text": "Лиссабон" }] },
                    "country": { "rich_text": [{ "plain_text": "Португалия" }] },
                    "intro": { "rich_text": [{ "plain_text": "Ищу опекуна" }] },
                    "catName": { "rich_text": [{ "plain_text": "Барсик" }] },
                    "catPhotoId": { "rich_text": [{ "plain_text": "photo-1" }] },
                    "catPhotoUrl": { "rich_text": [] },
                }
            }]
        })
        .to_string()
    }

    #[tokio::test]
    async fn find_parses_the_page_and_caches_it() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/databases/db-profiles/query")
            .with_status(200)
            .with_body(page_body())
            .expect(1)
            .create_async()
            .await;

        let repo = repo(&server.url());
        let profile = repo.find_by_tg_id(7).await.unwrap().unwrap();
        assert_eq!(profile.id.as_deref(), Some("page-1"));
        assert_eq!(profile.name, "Ада");
        assert_eq!(profile.cat_photo_url, None);

        // Second read is served from the cache; the mock allows one call.
        let cached = repo.find_by_tg_id(7).await.unwrap().unwrap();
        assert_eq!(cached, profile);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn transient_store_failures_exhaust_the_retry_budget() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/databases/db-profiles/query")
            .with_status(502)
            .expect(3)
            .create_async()
            .await;

        let repo = repo(&server.url());
        let err = repo.find_by_tg_id(7).await.unwrap_err();
        assert!(matches!(err, AppError::Dependency(_)));
        // Three hits on the mock: the initial attempt plus two retries.
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_profile_is_none_not_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/databases/db-profiles/query")
            .with_status(200)
            .with_body(r#"{"results":[]}"#)
            .create_async()
            .await;

        let repo = repo(&server.url());
        assert!(repo.find_by_tg_id(9).await.unwrap().is_none());
        let err = repo.ensure(9).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
