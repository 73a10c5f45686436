//! CLI subcommand implementations.

pub mod history;
pub mod import;
pub mod measurements;
pub mod range;
pub mod sensors;
pub mod status;
pub mod summary;
pub mod util;

#[cfg(test)]
pub mod test_support {
    use chrono::{DateTime, TimeZone, Utc};
    use pt_core::{
        ChannelId, ConnectionEvent, ConnectionEventType, DeviceId, PixelId, PixelRef, Reading,
        Sample, SensorId, SensorKind, SensorSample,
    };
    use pt_db::{ChannelRecord, Database};

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, minute, 0).unwrap()
    }

    fn pixel(device: &str, label: &str) -> PixelRef {
        PixelRef::new(DeviceId::new(device).unwrap(), PixelId::new(label).unwrap())
    }

    fn sample(channel: ChannelId, ts: DateTime<Utc>, power: f64) -> Sample {
        Sample {
            channel,
            timestamp: ts,
            reading: Reading::new(power, 1.0, Some(power)),
        }
    }

    fn sensor(kind: SensorKind, id: &str, ts: DateTime<Utc>, value: f64) -> SensorSample {
        SensorSample {
            kind,
            sensor: SensorId::new(id).unwrap(),
            timestamp: ts,
            value,
            raw_reading: None,
        }
    }

    /// `cell-1/A` on channel 1:1 with a gap from 10:30 to 11:00, plus
    /// `cell-2/B` on channel 2:1 from 10:05 to 10:50. Channel 3:1 is
    /// registered but never used.
    ///
    /// `cell-1/A` reads `temp-1` before the gap and `temp-2` after it;
    /// `cell-2/B` reads irradiance sensor `irr-1`.
    pub fn scenario_db() -> Database {
        use ConnectionEventType::{Connected, Disconnected};

        let ch1 = ChannelId::new(1, 1);
        let ch2 = ChannelId::new(2, 1);
        let a = pixel("cell-1", "A");
        let b = pixel("cell-2", "B");

        let mut first = ConnectionEvent::new(a.clone(), ch1, Connected, at(10, 0));
        first.temperature_sensor = Some("temp-1".to_string());
        let mut second = ConnectionEvent::new(a.clone(), ch1, Connected, at(11, 0));
        second.temperature_sensor = Some("temp-2".to_string());
        let mut lit = ConnectionEvent::new(b.clone(), ch2, Connected, at(10, 5));
        lit.irradiance_sensor = Some("irr-1".to_string());

        let mut db = Database::open_in_memory().unwrap();
        db.insert_channels(&[ChannelRecord::bare(ChannelId::new(3, 1))]).unwrap();
        db.insert_events(&[
            first,
            ConnectionEvent::new(a, ch1, Disconnected, at(10, 30)),
            second,
            lit,
            ConnectionEvent::new(b, ch2, Disconnected, at(10, 50)),
        ])
        .unwrap();
        db.insert_samples(&[
            sample(ch1, at(10, 15), 0.01),
            sample(ch1, at(10, 30), 0.5),
            sample(ch1, at(11, 15), 0.02),
            sample(ch1, at(11, 45), 0.03),
            sample(ch2, at(10, 20), 0.7),
        ])
        .unwrap();
        let mut irradiance = sensor(SensorKind::Irradiance, "irr-1", at(10, 20), 800.0);
        irradiance.raw_reading = Some(8000);
        db.insert_sensor_samples(&[
            sensor(SensorKind::Temperature, "temp-1", at(10, 10), 25.0),
            sensor(SensorKind::Temperature, "temp-1", at(10, 40), 26.0),
            sensor(SensorKind::Temperature, "temp-2", at(11, 10), 27.0),
            irradiance,
        ])
        .unwrap();
        db
    }
}
