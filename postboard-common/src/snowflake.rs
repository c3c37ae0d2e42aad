//! Snowflake IDs: 64-bit, time-ordered identifiers.
//!
//! From the most significant bit down, a snowflake holds 42 bits of milliseconds since an
//! [`Epoch`], a 5 bit worker id, a 5 bit process id and a 12 bit sequence number.
//!
//! See <https://discord.com/developers/docs/reference#snowflakes>

use derive_where::derive_where;
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, Unexpected, Visitor},
};
use std::{
    fmt::{Display, Formatter},
    marker::PhantomData,
    num::ParseIntError,
    str::FromStr,
};
use thiserror::Error;
use time::{Duration, UtcDateTime};

pub const TIMESTAMP_BITS: u32 = 42;
pub const WORKER_ID_BITS: u32 = 5;
pub const PROCESS_ID_BITS: u32 = 5;
pub const SEQUENCE_BITS: u32 = 12;

pub const SEQUENCE_SHIFT: u32 = 0;
pub const PROCESS_ID_SHIFT: u32 = SEQUENCE_SHIFT + SEQUENCE_BITS;
pub const WORKER_ID_SHIFT: u32 = PROCESS_ID_SHIFT + PROCESS_ID_BITS;
pub const TIMESTAMP_SHIFT: u32 = WORKER_ID_SHIFT + WORKER_ID_BITS;

pub const MAX_TIMESTAMP: u64 = low_bits(TIMESTAMP_BITS);
pub const MAX_SEQUENCE: u16 = 0xFFF;

const fn low_bits(count: u32) -> u64 {
    (1_u64 << count) - 1
}

pub trait Epoch {
    const EPOCH_TIME: UtcDateTime;
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Hash, Error)]
pub enum SnowflakeTimestampError {
    #[error("Specified time was before the snowflake epoch.")]
    TimeBeforeEpoch,
    #[error("Resulting timestamp uses too many bits.")]
    TimestampTooLarge,
}

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Error)]
#[error("{name} must be below {limit}, got {value}")]
pub struct MachineIdOutOfRangeError {
    name: &'static str,
    limit: u8,
    value: u8,
}

macro_rules! machine_id {
    ($(#[$meta:meta])* $name:ident, bits = $bits:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash, Serialize)]
        #[serde(transparent)]
        pub struct $name(u8);

        impl $name {
            pub const LIMIT: u8 = 1 << $bits;

            #[must_use]
            pub fn new(id: u8) -> Option<Self> {
                (id < Self::LIMIT).then_some(Self(id))
            }

            #[must_use]
            pub fn get(self) -> u8 {
                self.0
            }
        }

        impl TryFrom<u8> for $name {
            type Error = MachineIdOutOfRangeError;

            fn try_from(value: u8) -> Result<Self, Self::Error> {
                Self::new(value).ok_or(MachineIdOutOfRangeError {
                    name: stringify!($name),
                    limit: Self::LIMIT,
                    value,
                })
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                let inner = u8::deserialize(deserializer)?;
                Self::new(inner).ok_or_else(|| {
                    de::Error::invalid_value(Unexpected::Unsigned(inner.into()), &stringify!($name))
                })
            }
        }
    };
}

machine_id!(
    /// Identifies the machine a generator runs on.
    WorkerId,
    bits = WORKER_ID_BITS
);
machine_id!(
    /// Identifies the process on a worker.
    ProcessId,
    bits = PROCESS_ID_BITS
);

/// Milliseconds between `EPOCH_TIME` and `time`, checked to fit the timestamp bits.
pub fn millis_since_epoch<SnowflakeEpoch: Epoch>(
    time: UtcDateTime,
) -> Result<u64, SnowflakeTimestampError> {
    let millis = (time - SnowflakeEpoch::EPOCH_TIME).whole_milliseconds();
    if millis < 0 {
        return Err(SnowflakeTimestampError::TimeBeforeEpoch);
    }

    u64::try_from(millis)
        .ok()
        .filter(|millis| *millis <= MAX_TIMESTAMP)
        .ok_or(SnowflakeTimestampError::TimestampTooLarge)
}

/// A snowflake, serialized as a decimal string so that JavaScript clients keep every bit.
/// Deserialization accepts both strings and integers.
#[derive_where(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct Snowflake<SnowflakeEpoch>(u64, PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Snowflake<SnowflakeEpoch> {
    #[must_use]
    pub fn new(inner: u64) -> Self {
        Self(inner, PhantomData)
    }

    #[must_use]
    pub fn from_parts(
        timestamp_millis: u64,
        worker_id: WorkerId,
        process_id: ProcessId,
        sequence: u16,
    ) -> Self {
        let snowflake = (timestamp_millis & MAX_TIMESTAMP) << TIMESTAMP_SHIFT
            | u64::from(worker_id.get()) << WORKER_ID_SHIFT
            | u64::from(process_id.get()) << PROCESS_ID_SHIFT
            | (u64::from(sequence) & low_bits(SEQUENCE_BITS)) << SEQUENCE_SHIFT;

        Self::new(snowflake)
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn timestamp_millis(self) -> u64 {
        self.0 >> TIMESTAMP_SHIFT
    }

    #[must_use]
    pub fn worker_id(self) -> WorkerId {
        #[allow(clippy::cast_possible_truncation)]
        WorkerId(((self.0 >> WORKER_ID_SHIFT) & low_bits(WORKER_ID_BITS)) as u8)
    }

    #[must_use]
    pub fn process_id(self) -> ProcessId {
        #[allow(clippy::cast_possible_truncation)]
        ProcessId(((self.0 >> PROCESS_ID_SHIFT) & low_bits(PROCESS_ID_BITS)) as u8)
    }

    #[must_use]
    pub fn sequence(self) -> u16 {
        #[allow(clippy::cast_possible_truncation)]
        let sequence = ((self.0 >> SEQUENCE_SHIFT) & low_bits(SEQUENCE_BITS)) as u16;
        sequence
    }

    #[must_use]
    pub fn created_at(self) -> UtcDateTime
    where
        SnowflakeEpoch: Epoch,
    {
        // 42 bits of milliseconds always fit an i64.
        #[allow(clippy::cast_possible_wrap)]
        let millis = self.timestamp_millis() as i64;
        SnowflakeEpoch::EPOCH_TIME + Duration::milliseconds(millis)
    }
}

impl<SnowflakeEpoch> Display for Snowflake<SnowflakeEpoch> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl<SnowflakeEpoch> FromStr for Snowflake<SnowflakeEpoch> {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        u64::from_str(s).map(Self::new)
    }
}

impl<SnowflakeEpoch> From<u64> for Snowflake<SnowflakeEpoch> {
    fn from(value: u64) -> Self {
        Self::new(value)
    }
}

impl<SnowflakeEpoch> From<Snowflake<SnowflakeEpoch>> for u64 {
    fn from(value: Snowflake<SnowflakeEpoch>) -> Self {
        value.get()
    }
}

impl<SnowflakeEpoch> Serialize for Snowflake<SnowflakeEpoch> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

struct SnowflakeVisitor<SnowflakeEpoch>(PhantomData<SnowflakeEpoch>);

impl<SnowflakeEpoch> Visitor<'_> for SnowflakeVisitor<SnowflakeEpoch> {
    type Value = Snowflake<SnowflakeEpoch>;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a snowflake as a decimal string or unsigned integer")
    }

    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(Snowflake::new(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u64::try_from(v)
            .map(Snowflake::new)
            .map_err(|_| E::invalid_value(Unexpected::Signed(v), &self))
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        v.parse()
            .map_err(|_| E::invalid_value(Unexpected::Str(v), &self))
    }
}

impl<'de, SnowflakeEpoch> Deserialize<'de> for Snowflake<SnowflakeEpoch> {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(SnowflakeVisitor(PhantomData))
    }
}

/// Hands out strictly increasing snowflakes for one worker/process pair.
///
/// Within one millisecond the sequence number counts up. Once it is used up, or when the
/// clock goes backwards, the generator keeps counting on the last timestamp it issued, so it
/// never repeats itself.
#[derive_where(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub struct SnowflakeGenerator<SnowflakeEpoch> {
    worker_id: WorkerId,
    process_id: ProcessId,
    last_issued: Option<(u64, u16)>,
    phantom_data: PhantomData<SnowflakeEpoch>,
}

impl<SnowflakeEpoch> SnowflakeGenerator<SnowflakeEpoch> {
    #[must_use]
    pub fn new(worker_id: WorkerId, process_id: ProcessId) -> Self {
        Self {
            worker_id,
            process_id,
            last_issued: None,
            phantom_data: PhantomData,
        }
    }

    pub fn generate_at(
        &mut self,
        time: UtcDateTime,
    ) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError>
    where
        SnowflakeEpoch: Epoch,
    {
        let now = millis_since_epoch::<SnowflakeEpoch>(time)?;

        let (millis, sequence) = match self.last_issued {
            Some((last_millis, last_sequence)) if now <= last_millis => {
                if last_sequence == MAX_SEQUENCE {
                    (last_millis + 1, 0)
                } else {
                    (last_millis, last_sequence + 1)
                }
            }
            _ => (now, 0),
        };

        if millis > MAX_TIMESTAMP {
            return Err(SnowflakeTimestampError::TimestampTooLarge);
        }

        self.last_issued = Some((millis, sequence));
        Ok(Snowflake::from_parts(
            millis,
            self.worker_id,
            self.process_id,
            sequence,
        ))
    }

    pub fn generate(&mut self) -> Result<Snowflake<SnowflakeEpoch>, SnowflakeTimestampError>
    where
        SnowflakeEpoch: Epoch,
    {
        self.generate_at(UtcDateTime::now())
    }
}

#[cfg(test)]
mod tests {
    use crate::snowflake::{
        Epoch, MAX_SEQUENCE, MAX_TIMESTAMP, ProcessId, Snowflake, SnowflakeGenerator,
        SnowflakeTimestampError, WorkerId, millis_since_epoch,
    };
    use time::{Duration, UtcDateTime, macros::utc_datetime};

    struct MillennialEpoch;
    impl Epoch for MillennialEpoch {
        const EPOCH_TIME: UtcDateTime = utc_datetime!(2000-01-01 00:00);
    }

    type TestSnowflake = Snowflake<MillennialEpoch>;

    fn generator() -> SnowflakeGenerator<MillennialEpoch> {
        SnowflakeGenerator::new(WorkerId::new(10).unwrap(), ProcessId::new(3).unwrap())
    }

    #[test]
    fn machine_id_bounds() {
        for legal in [0, 0xD, 0x1F] {
            assert!(WorkerId::new(legal).is_some());
            assert!(ProcessId::new(legal).is_some());
        }
        for illegal in [0x20, 0xF0, u8::MAX] {
            assert!(WorkerId::new(illegal).is_none());
            assert!(ProcessId::try_from(illegal).is_err());
        }
    }

    #[test]
    fn epoch_offsets() {
        assert_eq!(
            millis_since_epoch::<MillennialEpoch>(MillennialEpoch::EPOCH_TIME),
            Ok(0)
        );
        assert_eq!(
            millis_since_epoch::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(1234)
            ),
            Ok(1234)
        );
        assert_eq!(
            millis_since_epoch::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME - Duration::milliseconds(1)
            ),
            Err(SnowflakeTimestampError::TimeBeforeEpoch)
        );
        assert_eq!(
            millis_since_epoch::<MillennialEpoch>(
                MillennialEpoch::EPOCH_TIME + Duration::milliseconds(0x0400_0000_0000)
            ),
            Err(SnowflakeTimestampError::TimestampTooLarge)
        );
    }

    #[test]
    fn parts_survive_packing() {
        let worker_id = WorkerId::new(0b10101).unwrap();
        let process_id = ProcessId::new(0b10001).unwrap();
        let snowflake = TestSnowflake::from_parts(MAX_TIMESTAMP, worker_id, process_id, 100);

        assert_eq!(snowflake.timestamp_millis(), MAX_TIMESTAMP);
        assert_eq!(snowflake.worker_id(), worker_id);
        assert_eq!(snowflake.process_id(), process_id);
        assert_eq!(snowflake.sequence(), 100);
    }

    #[test]
    fn generator_counts_within_a_millisecond() {
        let time = utc_datetime!(2025-10-24 10:55);
        let mut generator = generator();

        let first = generator.generate_at(time).unwrap();
        let second = generator.generate_at(time).unwrap();

        assert_eq!(first.sequence(), 0);
        assert_eq!(second.sequence(), 1);
        assert_eq!(first.timestamp_millis(), second.timestamp_millis());
        assert_eq!(first.created_at(), time);
        assert!(first < second);
    }

    #[test]
    fn generator_resets_sequence_on_new_millisecond() {
        let time = utc_datetime!(2025-10-24 10:55);
        let mut generator = generator();

        generator.generate_at(time).unwrap();
        let later = generator
            .generate_at(time + Duration::milliseconds(5))
            .unwrap();

        assert_eq!(later.sequence(), 0);
        assert_eq!(later.created_at(), time + Duration::milliseconds(5));
    }

    #[test]
    fn generator_never_goes_backwards() {
        let time = utc_datetime!(2025-10-24 10:55);
        let mut generator = generator();

        let mut previous = generator.generate_at(time).unwrap();
        for _ in 0..=MAX_SEQUENCE {
            let next = generator.generate_at(time).unwrap();
            assert!(next > previous);
            previous = next;
        }
        // The sequence for `time` is exhausted, so the last id moved one millisecond ahead.
        assert_eq!(previous.created_at(), time + Duration::milliseconds(1));

        let behind = generator
            .generate_at(time - Duration::seconds(10))
            .unwrap();
        assert!(behind > previous);
    }

    #[test]
    fn serializes_as_string() {
        let snowflake = TestSnowflake::new(9_007_199_254_740_993);

        assert_eq!(
            serde_json::to_string(&snowflake).unwrap(),
            "\"9007199254740993\""
        );
        assert_eq!(
            serde_json::from_str::<TestSnowflake>("\"9007199254740993\"").unwrap(),
            snowflake
        );
        assert_eq!(
            serde_json::from_str::<TestSnowflake>("42").unwrap(),
            TestSnowflake::new(42)
        );
        assert!(serde_json::from_str::<TestSnowflake>("\"P1\"").is_err());
        assert!(serde_json::from_str::<TestSnowflake>("-1").is_err());
    }
}
