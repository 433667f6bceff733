//! Particulates, ozone and the European AQI from the open-meteo air-quality API

use super::{Feed, FeedDescriptor, FeedUpdate, FetchContext, FetchError};
use crate::config::{FeedConfig, LocationConfig};
use crate::state::{AirQuality, Dashboard};
use crate::transport::HttpRequest;
use async_trait::async_trait;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct AirQualityResponse {
    current: Current,
}

#[derive(Debug, Deserialize)]
struct Current {
    pm10: f32,
    pm2_5: f32,
    ozone: f32,
    european_aqi: i32,
}

pub struct AirQualityFeed {
    descriptor: FeedDescriptor,
    url: String,
}

impl AirQualityFeed {
    pub fn new(feed: &FeedConfig, location: &LocationConfig) -> Self {
        let url = format!(
            "{}?latitude={}&longitude={}&current=pm10,pm2_5,ozone,european_aqi&timezone=auto",
            feed.url, location.latitude, location.longitude
        );
        Self {
            descriptor: FeedDescriptor {
                name: "air_quality",
                label: "Air quality",
                interval_secs: feed.interval_secs as i64,
                requires_token: false,
            },
            url,
        }
    }
}

#[async_trait]
impl Feed for AirQualityFeed {
    fn descriptor(&self) -> &FeedDescriptor {
        &self.descriptor
    }

    fn last_update(&self, dashboard: &Dashboard) -> i64 {
        dashboard.air_quality.update_time
    }

    async fn fetch(&self, ctx: &FetchContext<'_>) -> Result<FeedUpdate, FetchError> {
        let current = ctx
            .fetch_json::<AirQualityResponse>(HttpRequest::get(&self.url))
            .await?
            .current;

        Ok(FeedUpdate::AirQuality(AirQuality {
            pm10: current.pm10,
            pm2_5: current.pm2_5,
            ozone: current.ozone,
            european_aqi: current.european_aqi,
            update_time: ctx.timestamp(),
            time_string: ctx.clock_label(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feeds::test_support::Harness;
    use crate::transport::scripted::ScriptedReply;

    #[tokio::test]
    async fn test_fetch_reads_current_block() {
        let harness = Harness::new();
        let body = r#"{"current":{"pm10":12.5,"pm2_5":7.25,"ozone":61.0,"european_aqi":24}}"#;
        let (head, tail) = body.split_at(40);
        let framed = format!("{:x}\r\n{head}\r\n{:x}\r\n{tail}\r\n0\r\n\r\n", head.len(), tail.len());
        harness.scripted.push(ScriptedReply::ok_chunked(framed));
        let feed = AirQualityFeed::new(
            &FeedConfig {
                interval_secs: 1800,
                url: "https://aq.test/v1/air-quality".to_string(),
            },
            &LocationConfig::default(),
        );

        let update = feed.fetch(&harness.ctx()).await.unwrap();
        assert_eq!(
            update.summary().unwrap(),
            "Air quality updated. PM10: 12.50, PM2.5: 7.25, Ozone: 61.00, AQI: 24"
        );
    }
}
