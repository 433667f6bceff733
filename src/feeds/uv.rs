//! UV index from the weatherbit current-conditions API

use super::{Feed, FeedDescriptor, FeedUpdate, FetchContext, FetchError};
use crate::config::{FeedConfig, LocationConfig};
use crate::state::{Dashboard, Uv};
use crate::transport::HttpRequest;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct CurrentResponse {
    data: Vec<Observation>,
}

#[derive(Debug, Deserialize)]
struct Observation {
    uv: f64,
}

pub struct UvFeed {
    descriptor: FeedDescriptor,
    url: String,
}

impl UvFeed {
    pub fn new(feed: &FeedConfig, location: &LocationConfig, api_key: Option<&str>) -> Self {
        let url = format!(
            "{}?city_id={}&key={}",
            feed.url,
            location.city_id,
            api_key.unwrap_or_default()
        );
        Self {
            descriptor: FeedDescriptor {
                name: "uv",
                label: "UV",
                interval_secs: feed.interval_secs as i64,
                requires_token: false,
            },
            url,
        }
    }
}

#[async_trait]
impl Feed for UvFeed {
    fn descriptor(&self) -> &FeedDescriptor {
        &self.descriptor
    }

    fn last_update(&self, dashboard: &Dashboard) -> i64 {
        dashboard.uv.update_time
    }

    /// After dark the index is zero and the API is not asked
    fn override_update(&self, dashboard: &Dashboard, now: &DateTime<FixedOffset>) -> Option<FeedUpdate> {
        if dashboard.weather.is_day {
            return None;
        }
        let update_time = if dashboard.weather.update_time > 0 {
            now.timestamp()
        } else {
            dashboard.uv.update_time
        };
        Some(FeedUpdate::UvDark {
            update_time,
            time_string: crate::state::clock_label(now),
        })
    }

    /// The API looks down; wait a full interval before asking again
    fn on_decode_failure(&self, dashboard: &mut Dashboard, now: i64) {
        dashboard.uv.update_time = now;
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FeedUpdate, FetchError> {
        let response: CurrentResponse = ctx.fetch_json(HttpRequest::get(&self.url)).await?;
        let observation = response
            .data
            .first()
            .ok_or_else(|| FetchError::Api("no UV observation".to_string()))?;

        Ok(FeedUpdate::Uv(Uv {
            index: observation.uv as i32,
            update_time: ctx.timestamp(),
            time_string: ctx.clock_label(),
        }))
    }
}
