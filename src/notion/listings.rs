use serde_json::{json, Value};

use crate::core::errors::{AppError, AppResult};
use crate::core::retry::{with_retry, RetryOptions};
use crate::domain::Listing;
use crate::notion::{
    non_empty, number, number_value, plain_text, rich_text, title, title_text, Client,
};

/// Listings stored in the Notion listings database. Reads are rare and
/// owner-scoped, so there is no cache in front of this repository.
#[derive(Debug, Clone)]
pub struct ListingsRepo {
    client: Client,
    database_id: String,
    retry: RetryOptions,
}

impl ListingsRepo {
    pub fn new(client: Client, database_id: String) -> Self {
        Self {
            client,
            database_id,
            retry: RetryOptions::default(),
        }
    }

    pub async fn create(&self, listing: &Listing) -> AppResult<Listing> {
        let properties = listing_properties(listing);
        let page = with_retry("notion.listings.create", &self.retry, || {
            self.client.create_page(&self.database_id, properties.clone())
        })
        .await?;
        Ok(page_to_listing(&page))
    }

    pub async fn get_by_id(&self, listing_id: &str) -> AppResult<Option<Listing>> {
        let result = with_retry("notion.listings.get", &self.retry, || {
            self.client.retrieve_page(listing_id)
        })
        .await;
        match result {
            Ok(page) => Ok(Some(page_to_listing(&page))),
            Err(AppError::NotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }

    pub async fn update_channel_message(
        &self,
        listing_id: &str,
        message_id: i64,
    ) -> AppResult<()> {
        let properties = json!({ "channelMessageId": number(message_id) });
        with_retry("notion.listings.channel_message", &self.retry, || {
            self.client.update_page(listing_id, properties.clone())
        })
        .await?;
        Ok(())
    }
}

fn listing_properties(listing: &Listing) -> Value {
    let mut properties = json!({
        "apartmentDescription": title(&listing.apartment_description),
        "ownerTgId": number(listing.owner_tg_id),
        "profileId": rich_text(&listing.profile_id),
        "city": rich_text(&listing.city),
        "country": rich_text(&listing.country),
        "apartmentPhotoId": rich_text(&listing.apartment_photo_id),
        "apartmentPhotoUrl": rich_text(listing.apartment_photo_url.as_deref().unwrap_or_default()),
        "dates": rich_text(&listing.dates),
        "conditions": rich_text(&listing.conditions),
        "preferredDestinations": rich_text(&listing.preferred_destinations),
    });
    if let Some(message_id) = listing.channel_message_id {
        properties["channelMessageId"] = number(message_id);
    }
    properties
}

fn page_to_listing(page: &Value) -> Listing {
    let props = &page["properties"];
    Listing {
        id: page["id"].as_str().map(str::to_string),
        owner_tg_id: number_value(&props["ownerTgId"]).unwrap_or_default(),
        profile_id: plain_text(&props["profileId"]),
        city: plain_text(&props["city"]),
        country: plain_text(&props["country"]),
        apartment_description: title_text(&props["apartmentDescription"]),
        apartment_photo_id: plain_text(&props["apartmentPhotoId"]),
        apartment_photo_url: non_empty(plain_text(&props["apartmentPhotoUrl"])),
        dates: plain_text(&props["dates"]),
        conditions: plain_text(&props["conditions"]),
        preferred_destinations: plain_text(&props["preferredDestinations"]),
        channel_message_id: number_value(&props["channelMessageId"]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::NotionConfig;
    use std::time::Duration;

    fn repo(base_url: &str) -> ListingsRepo {
        let client = Client::new(&NotionConfig {
            token: "secret".into(),
            base_url: base_url.into(),
            db_profiles: "db-profiles".into(),
            db_listings: "db-listings".into(),
        })
        .unwrap();
        let mut repo = ListingsRepo::new(client, "db-listings".into());
        repo.retry = RetryOptions {
            initial_delay: Duration::from_millis(5),
            ..RetryOptions::default()
        };
        repo
    }

    #[tokio::test]
    async fn create_round_trips_the_page_id() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v1/pages")
            .with_status(200)
            .with_body(
                json!({
                    "id": "listing-1",
                    "properties": {
                        "ownerTgId": { "number": 7 },
                        "apartmentDescription": { "title": [{ "plain_text": "Студия" }] },
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let repo = repo(&server.url());
        let listing = Listing {
            id: None,
            owner_tg_id: 7,
            profile_id: "page-1".into(),
            city: "Лиссабон".into(),
            country: "Португалия".into(),
            apartment_description: "Студия".into(),
            apartment_photo_id: "photo-2".into(),
            apartment_photo_url: None,
            dates: "июнь".into(),
            conditions: "обмен".into(),
            preferred_destinations: "Берлин".into(),
            channel_message_id: None,
        };
        let stored = repo.create(&listing).await.unwrap();
        assert_eq!(stored.id.as_deref(), Some("listing-1"));
        assert_eq!(stored.owner_tg_id, 7);
    }

    #[tokio::test]
    async fn missing_page_reads_as_none() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/v1/pages/gone")
            .with_status(404)
            .with_body(r#"{"object":"error"}"#)
            .create_async()
            .await;

        let repo = repo(&server.url());
        assert!(repo.get_by_id("gone").await.unwrap().is_none());
    }
}
