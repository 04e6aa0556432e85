//! Generic dispatcher: type code to codec.
//!
//! Each direction has one table, built on first use by registering every
//! codec for that direction. Registration fails if two codecs claim the
//! same code, which surfaces as [`ProtocolError::DuplicateRegistration`]
//! from every parse instead of silently shadowing a codec.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::error::{ProtocolError, ProtocolResult};
use crate::flags::MessageFlags;
use crate::frame::{FrameReader, split_frame};
use crate::messages::{
    B2sMessage, ConfirmConfigure, ConfirmExactSubscription, ConfirmGlobSubscription,
    ConfirmNotify, ConfirmReceive, Configure, EnableZstdCustom, EnableZstdPreset,
    ExactSubscription, GlobSubscription, MessageCodec, Notify, S2bMessage, StreamContinue,
    StreamPart,
};
use crate::types::{B2sType, MessageKind, S2bType};

type ParseFn<K, M> = fn(MessageFlags, K, &mut FrameReader<'_>) -> ProtocolResult<M>;

fn parse_as<K, C, M>(
    flags: MessageFlags,
    kind: K,
    reader: &mut FrameReader<'_>,
) -> ProtocolResult<M>
where
    K: MessageKind,
    C: MessageCodec<K>,
    M: From<C>,
{
    C::parse(flags, kind, reader).map(M::from)
}

/// Maps the type codes of one direction to their parsers.
pub struct Dispatcher<K: MessageKind, M> {
    parsers: HashMap<u8, (K, ParseFn<K, M>)>,
}

impl<K: MessageKind, M> fmt::Debug for Dispatcher<K, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut codes: Vec<_> = self.parsers.keys().copied().collect();
        codes.sort_unstable();
        f.debug_struct("Dispatcher").field("codes", &codes).finish()
    }
}

impl<K: MessageKind, M> Default for Dispatcher<K, M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: MessageKind, M> Dispatcher<K, M> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            parsers: HashMap::new(),
        }
    }

    /// Registers every type code `C` accepts.
    ///
    /// Nothing is registered if any of the codes is already taken.
    pub fn register<C>(&mut self) -> ProtocolResult<&mut Self>
    where
        C: MessageCodec<K>,
        M: From<C>,
    {
        if let Some(taken) = C::kinds()
            .iter()
            .find(|kind| self.parsers.contains_key(&kind.code()))
        {
            return Err(ProtocolError::DuplicateRegistration { code: taken.code() });
        }

        for kind in C::kinds() {
            self.parsers
                .insert(kind.code(), (*kind, parse_as::<K, C, M> as ParseFn<K, M>));
        }
        Ok(self)
    }

    /// True if `code` has a parser.
    pub fn handles(&self, code: u8) -> bool {
        self.parsers.contains_key(&code)
    }

    /// Kinds with no registered parser.
    pub fn missing(&self) -> Vec<K> {
        K::ALL
            .iter()
            .copied()
            .filter(|kind| !self.handles(kind.code()))
            .collect()
    }

    /// Parses the header section and body of a frame whose prefix has
    /// already been split off.
    ///
    /// Every byte must be consumed; kinds without a body reject trailing
    /// data.
    pub fn parse_message(
        &self,
        flags: MessageFlags,
        type_code: u8,
        reader: &mut FrameReader<'_>,
    ) -> ProtocolResult<M> {
        let (kind, parse) = self
            .parsers
            .get(&type_code)
            .ok_or(ProtocolError::UnknownMessageType { code: type_code })?;

        let message = parse(flags, *kind, reader)?;
        if !reader.is_empty() {
            return Err(ProtocolError::malformed(
                "body",
                format!(
                    "{} trailing bytes after {}",
                    reader.remaining(),
                    kind.name()
                ),
            ));
        }
        Ok(message)
    }

    /// Parses a complete frame.
    pub fn parse_frame(&self, data: &[u8]) -> ProtocolResult<M> {
        let mut raw = split_frame(data)?;
        self.parse_message(raw.flags, raw.type_code, &mut raw.reader)
    }
}

fn build_s2b() -> ProtocolResult<Dispatcher<S2bType, S2bMessage>> {
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register::<Configure>()?
        .register::<ExactSubscription>()?
        .register::<GlobSubscription>()?
        .register::<Notify>()?
        .register::<StreamPart>()?
        .register::<StreamContinue>()?
        .register::<ConfirmReceive>()?;
    Ok(dispatcher)
}

fn build_b2s() -> ProtocolResult<Dispatcher<B2sType, B2sMessage>> {
    let mut dispatcher = Dispatcher::new();
    dispatcher
        .register::<ConfirmConfigure>()?
        .register::<ConfirmExactSubscription>()?
        .register::<ConfirmGlobSubscription>()?
        .register::<ConfirmNotify>()?
        .register::<StreamContinue>()?
        .register::<StreamPart>()?
        .register::<EnableZstdPreset>()?
        .register::<EnableZstdCustom>()?;
    Ok(dispatcher)
}

static S2B: LazyLock<ProtocolResult<Dispatcher<S2bType, S2bMessage>>> = LazyLock::new(build_s2b);
static B2S: LazyLock<ProtocolResult<Dispatcher<B2sType, B2sMessage>>> = LazyLock::new(build_b2s);

/// Table for frames a broadcaster receives.
pub fn s2b_dispatcher() -> ProtocolResult<&'static Dispatcher<S2bType, S2bMessage>> {
    S2B.as_ref().map_err(Clone::clone)
}

/// Table for frames a subscriber receives.
pub fn b2s_dispatcher() -> ProtocolResult<&'static Dispatcher<B2sType, B2sMessage>> {
    B2S.as_ref().map_err(Clone::clone)
}

/// Parses a frame sent by a subscriber.
pub fn parse_s2b_frame(data: &[u8]) -> ProtocolResult<S2bMessage> {
    s2b_dispatcher()?.parse_frame(data)
}

/// Parses a frame sent by a broadcaster.
pub fn parse_b2s_frame(data: &[u8]) -> ProtocolResult<B2sMessage> {
    b2s_dispatcher()?.parse_frame(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_cover_every_kind() {
        assert!(s2b_dispatcher().unwrap().missing().is_empty());
        assert!(b2s_dispatcher().unwrap().missing().is_empty());
    }

    #[test]
    fn registering_a_code_twice_fails() {
        let mut dispatcher: Dispatcher<S2bType, S2bMessage> = Dispatcher::new();
        dispatcher.register::<Notify>().unwrap();
        assert_eq!(
            dispatcher.register::<Notify>().unwrap_err(),
            ProtocolError::DuplicateRegistration { code: 6 }
        );
    }

    #[test]
    fn unknown_codes_are_rejected() {
        assert_eq!(
            parse_s2b_frame(&[0, 42]).unwrap_err(),
            ProtocolError::UnknownMessageType { code: 42 }
        );
        assert_eq!(
            parse_b2s_frame(&[0, 0]).unwrap_err(),
            ProtocolError::UnknownMessageType { code: 0 }
        );
    }

    #[test]
    fn trailing_bytes_after_bodiless_kind_are_rejected() {
        let confirm = ConfirmReceive {
            identifier: bytes::Bytes::from_static(b"id"),
        };
        let mut frame = confirm.serialize(true).unwrap().to_vec();
        frame.push(0xff);
        assert!(matches!(
            parse_s2b_frame(&frame),
            Err(ProtocolError::MalformedMessage { header: "body", .. })
        ));
    }

    #[test]
    fn same_code_means_different_kinds_per_direction() {
        let cont = StreamContinue {
            identifier: bytes::Bytes::from_static(b"n"),
            part_id: 3,
        };
        let s2b = MessageCodec::<S2bType>::serialize(&cont, true).unwrap();
        let b2s = MessageCodec::<B2sType>::serialize(&cont, true).unwrap();
        assert_eq!(s2b[1], 8);
        assert_eq!(b2s[1], 7);
        assert_eq!(
            parse_s2b_frame(&s2b).unwrap(),
            S2bMessage::ContinueReceive(cont.clone())
        );
        assert_eq!(
            parse_b2s_frame(&b2s).unwrap(),
            B2sMessage::ContinueNotify(cont)
        );
    }
}
