//! Fixed-width little-endian layouts for the persisted feed records
//!
//! Text fields occupy a fixed number of bytes, zero padded. Longer display
//! text is cut at a character boundary on encode; the token is never cut.

use super::{AirQuality, AuthToken, EnergyTotals, Solar, Uv, Weather};
use bytes::{Buf, BufMut};
use thiserror::Error;

const SHORT_TEXT: usize = 16;
const LONG_TEXT: usize = 64;
const TOKEN_TEXT: usize = 2048;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("record is {found} bytes, expected {expected}")]
    Length { expected: usize, found: usize },

    #[error("field '{0}' is not valid UTF-8")]
    Text(&'static str),

    #[error("field '{field}' is {len} bytes, limit is {limit}")]
    TooLong {
        field: &'static str,
        len: usize,
        limit: usize,
    },
}

/// A feed state that is persisted as one fixed-size state record
pub trait Record: Sized {
    const FILE_NAME: &'static str;
    const ENCODED_LEN: usize;

    fn encode(&self) -> Vec<u8>;

    fn decode(bytes: &[u8]) -> Result<Self, RecordError>;

    /// Refuse values that `encode` could only store damaged
    fn check(&self) -> Result<(), RecordError> {
        Ok(())
    }
}

fn put_text(buf: &mut Vec<u8>, text: &str, width: usize) {
    let mut end = text.len().min(width);
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    buf.put_slice(&text.as_bytes()[..end]);
    buf.put_bytes(0, width - end);
}

fn get_text(buf: &mut &[u8], width: usize, field: &'static str) -> Result<String, RecordError> {
    let raw = &buf[..width];
    let len = raw.iter().position(|b| *b == 0).unwrap_or(width);
    let text = std::str::from_utf8(&raw[..len])
        .map_err(|_| RecordError::Text(field))?
        .to_string();
    buf.advance(width);
    Ok(text)
}

fn check_len(bytes: &[u8], expected: usize) -> Result<(), RecordError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(RecordError::Length {
            expected,
            found: bytes.len(),
        })
    }
}

fn put_totals(buf: &mut Vec<u8>, totals: &EnergyTotals) {
    buf.put_f32_le(totals.bought);
    buf.put_f32_le(totals.used);
    buf.put_f32_le(totals.generated);
}

fn get_totals(buf: &mut &[u8]) -> EnergyTotals {
    EnergyTotals {
        bought: buf.get_f32_le(),
        used: buf.get_f32_le(),
        generated: buf.get_f32_le(),
    }
}

impl Record for Weather {
    const FILE_NAME: &'static str = "weather_data.bin";
    const ENCODED_LEN: usize = 4 * 4 + 1 + 8 + SHORT_TEXT + LONG_TEXT + SHORT_TEXT;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.put_f32_le(self.temperature);
        buf.put_f32_le(self.wind_speed);
        buf.put_f32_le(self.max_temp);
        buf.put_f32_le(self.min_temp);
        buf.put_u8(u8::from(self.is_day));
        buf.put_i64_le(self.update_time);
        put_text(&mut buf, &self.wind_dir, SHORT_TEXT);
        put_text(&mut buf, &self.description, LONG_TEXT);
        put_text(&mut buf, &self.time_string, SHORT_TEXT);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::ENCODED_LEN)?;
        let mut buf = bytes;
        Ok(Self {
            temperature: buf.get_f32_le(),
            wind_speed: buf.get_f32_le(),
            max_temp: buf.get_f32_le(),
            min_temp: buf.get_f32_le(),
            is_day: buf.get_u8() != 0,
            update_time: buf.get_i64_le(),
            wind_dir: get_text(&mut buf, SHORT_TEXT, "wind_dir")?,
            description: get_text(&mut buf, LONG_TEXT, "description")?,
            time_string: get_text(&mut buf, SHORT_TEXT, "time_string")?,
        })
    }
}

impl Record for Uv {
    const FILE_NAME: &'static str = "uv_data.bin";
    const ENCODED_LEN: usize = 4 + 8 + SHORT_TEXT;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.put_i32_le(self.index);
        buf.put_i64_le(self.update_time);
        put_text(&mut buf, &self.time_string, SHORT_TEXT);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::ENCODED_LEN)?;
        let mut buf = bytes;
        Ok(Self {
            index: buf.get_i32_le(),
            update_time: buf.get_i64_le(),
            time_string: get_text(&mut buf, SHORT_TEXT, "time_string")?,
        })
    }
}

impl Record for AirQuality {
    const FILE_NAME: &'static str = "air_quality_data.bin";
    const ENCODED_LEN: usize = 3 * 4 + 4 + 8 + SHORT_TEXT;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.put_f32_le(self.pm10);
        buf.put_f32_le(self.pm2_5);
        buf.put_f32_le(self.ozone);
        buf.put_i32_le(self.european_aqi);
        buf.put_i64_le(self.update_time);
        put_text(&mut buf, &self.time_string, SHORT_TEXT);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::ENCODED_LEN)?;
        let mut buf = bytes;
        Ok(Self {
            pm10: buf.get_f32_le(),
            pm2_5: buf.get_f32_le(),
            ozone: buf.get_f32_le(),
            european_aqi: buf.get_i32_le(),
            update_time: buf.get_i64_le(),
            time_string: get_text(&mut buf, SHORT_TEXT, "time_string")?,
        })
    }
}

/// `extremes` is not part of this record; it lives in the prefs store
impl Record for Solar {
    const FILE_NAME: &'static str = "solar_data.bin";
    const ENCODED_LEN: usize = 3 * 8 + 5 * 4 + SHORT_TEXT + 1 + 2 * 3 * 4;

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        buf.put_i64_le(self.current_update_time);
        buf.put_i64_le(self.daily_update_time);
        buf.put_i64_le(self.monthly_update_time);
        buf.put_f32_le(self.battery_charge);
        buf.put_f32_le(self.using_power);
        buf.put_f32_le(self.grid_power);
        buf.put_f32_le(self.battery_power);
        buf.put_f32_le(self.solar_power);
        put_text(&mut buf, &self.time, SHORT_TEXT);
        buf.put_u8(u8::from(self.minmax_reset));
        put_totals(&mut buf, &self.today);
        put_totals(&mut buf, &self.month);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::ENCODED_LEN)?;
        let mut buf = bytes;
        Ok(Self {
            current_update_time: buf.get_i64_le(),
            daily_update_time: buf.get_i64_le(),
            monthly_update_time: buf.get_i64_le(),
            battery_charge: buf.get_f32_le(),
            using_power: buf.get_f32_le(),
            grid_power: buf.get_f32_le(),
            battery_power: buf.get_f32_le(),
            solar_power: buf.get_f32_le(),
            time: get_text(&mut buf, SHORT_TEXT, "time")?,
            minmax_reset: buf.get_u8() != 0,
            today: get_totals(&mut buf),
            month: get_totals(&mut buf),
            extremes: Default::default(),
        })
    }
}

impl Record for AuthToken {
    const FILE_NAME: &'static str = "solar_token.bin";
    const ENCODED_LEN: usize = TOKEN_TEXT + 8;

    /// A cut token would restore as a credential the server rejects
    fn check(&self) -> Result<(), RecordError> {
        if self.token.len() > TOKEN_TEXT {
            return Err(RecordError::TooLong {
                field: "token",
                len: self.token.len(),
                limit: TOKEN_TEXT,
            });
        }
        Ok(())
    }

    fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::ENCODED_LEN);
        put_text(&mut buf, &self.token, TOKEN_TEXT);
        buf.put_i64_le(self.acquired_at);
        buf
    }

    fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        check_len(bytes, Self::ENCODED_LEN)?;
        let mut buf = bytes;
        Ok(Self {
            token: get_text(&mut buf, TOKEN_TEXT, "token")?,
            acquired_at: buf.get_i64_le(),
        })
    }
}
