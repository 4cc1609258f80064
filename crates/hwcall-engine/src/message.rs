//! Message types and the protobuf schemas the engine builds or inspects.
//!
//! The full message catalog belongs to the application; the engine only
//! needs the identifiers below and the handful of bodies it constructs
//! itself (acks, cancel) or reads (failure).

use bytes::Bytes;
use hwcall_frame::{checked_type_id, Frame};

use crate::error::Result;

macro_rules! message_types {
    ($($name:ident = $id:literal,)+) => {
        /// Protocol message type identifiers.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(u16)]
        pub enum MessageType {
            $($name = $id,)+
        }

        impl MessageType {
            /// Every known message type.
            pub const ALL: &'static [MessageType] = &[$(MessageType::$name,)+];

            /// Look up a wire identifier.
            pub fn from_id(id: u16) -> Option<Self> {
                match id {
                    $($id => Some(MessageType::$name),)+
                    _ => None,
                }
            }

            /// Schema name, as used in event labels.
            pub fn name(self) -> &'static str {
                match self {
                    $(MessageType::$name => stringify!($name),)+
                }
            }
        }
    };
}

message_types! {
    Initialize = 0,
    Ping = 1,
    Success = 2,
    Failure = 3,
    ChangePin = 4,
    WipeDevice = 5,
    FirmwareErase = 6,
    FirmwareUpload = 7,
    GetEntropy = 9,
    Entropy = 10,
    GetPublicKey = 11,
    PublicKey = 12,
    LoadDevice = 13,
    ResetDevice = 14,
    SignTx = 15,
    Features = 17,
    PinMatrixRequest = 18,
    PinMatrixAck = 19,
    Cancel = 20,
    TxRequest = 21,
    TxAck = 22,
    CipherKeyValue = 23,
    ClearSession = 24,
    ApplySettings = 25,
    ButtonRequest = 26,
    ButtonAck = 27,
    GetAddress = 29,
    Address = 30,
    EntropyRequest = 35,
    EntropyAck = 36,
    SignMessage = 38,
    VerifyMessage = 39,
    MessageSignature = 40,
    PassphraseRequest = 41,
    PassphraseAck = 42,
    RecoveryDevice = 45,
    WordRequest = 46,
    WordAck = 47,
    CipheredKeyValue = 48,
    EncryptMessage = 49,
    EncryptedMessage = 50,
    DecryptMessage = 51,
    DecryptedMessage = 52,
    SignIdentity = 53,
    SignedIdentity = 54,
    GetFeatures = 55,
    CharacterRequest = 80,
    CharacterAck = 81,
    RawTxAck = 82,
    ApplyPolicies = 83,
    FlashHash = 84,
    FlashWrite = 85,
    FlashHashResponse = 86,
    DebugLinkFlashDump = 87,
    DebugLinkFlashDumpResponse = 88,
    SoftReset = 89,
    DebugLinkDecision = 100,
    DebugLinkGetState = 101,
    DebugLinkState = 102,
    DebugLinkStop = 103,
    DebugLinkLog = 104,
    DebugLinkFillConfig = 105,
}

impl MessageType {
    pub const fn id(self) -> u16 {
        self as u16
    }

    /// Replies to a device prompt. Sending one means a prompt is active.
    pub fn is_ack(self) -> bool {
        matches!(
            self,
            MessageType::ButtonAck
                | MessageType::PassphraseAck
                | MessageType::CharacterAck
                | MessageType::PinMatrixAck
                | MessageType::WordAck
        )
    }
}

/// Failure codes carried by [`Failure`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum FailureType {
    UnexpectedMessage = 1,
    ButtonExpected = 2,
    SyntaxError = 3,
    ActionCancelled = 4,
    PinExpected = 5,
    PinCancelled = 6,
    PinInvalid = 7,
    InvalidSignature = 8,
    Other = 9,
    NotEnoughFunds = 10,
    NotInitialized = 11,
    PinMismatch = 12,
    FirmwareError = 99,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Failure {
    #[prost(enumeration = "FailureType", optional, tag = "1")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub message: Option<String>,
}

impl Failure {
    pub fn new(code: FailureType, message: impl Into<String>) -> Self {
        Self {
            code: Some(code as i32),
            message: Some(message.into()),
        }
    }
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Success {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Ping {
    #[prost(string, optional, tag = "1")]
    pub message: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub button_protection: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub pin_protection: Option<bool>,
    #[prost(bool, optional, tag = "4")]
    pub passphrase_protection: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ButtonRequest {
    #[prost(int32, optional, tag = "1")]
    pub code: Option<i32>,
    #[prost(string, optional, tag = "2")]
    pub data: Option<String>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ButtonAck {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntropyRequest {}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct EntropyAck {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub entropy: Option<Vec<u8>>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PinMatrixRequest {
    #[prost(int32, optional, tag = "1")]
    pub r#type: Option<i32>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PinMatrixAck {
    /// PIN as positions on the scrambled matrix shown by the device.
    #[prost(string, required, tag = "1")]
    pub pin: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct PassphraseAck {
    #[prost(string, required, tag = "1")]
    pub passphrase: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct CharacterAck {
    #[prost(string, optional, tag = "1")]
    pub character: Option<String>,
    #[prost(bool, optional, tag = "2")]
    pub delete: Option<bool>,
    #[prost(bool, optional, tag = "3")]
    pub done: Option<bool>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WordAck {
    #[prost(string, required, tag = "1")]
    pub word: String,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Cancel {}

/// A message as it travels through the engine: type plus serialized body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub type_id: u16,
    pub payload: Bytes,
}

impl Message {
    /// Serialize a known message body.
    pub fn new(kind: MessageType, body: &impl prost::Message) -> Self {
        Self {
            type_id: kind.id(),
            payload: body.encode_to_vec().into(),
        }
    }

    /// Wrap an already serialized body.
    pub fn raw(type_id: u16, payload: impl Into<Bytes>) -> Self {
        Self {
            type_id,
            payload: payload.into(),
        }
    }

    /// Wrap a body under an identifier from a wider enum space.
    pub fn from_raw_id(type_id: u32, payload: impl Into<Bytes>) -> Result<Self> {
        Ok(Self::raw(checked_type_id(type_id)?, payload))
    }

    pub fn message_type(&self) -> Option<MessageType> {
        MessageType::from_id(self.type_id)
    }

    pub fn is(&self, kind: MessageType) -> bool {
        self.type_id == kind.id()
    }

    /// Decode the body as `M`.
    pub fn decode<M: prost::Message + Default>(&self) -> Result<M> {
        Ok(M::decode(self.payload.clone())?)
    }
}

impl From<Frame> for Message {
    fn from(frame: Frame) -> Self {
        Self::raw(frame.type_id, frame.payload)
    }
}

impl From<Message> for Frame {
    fn from(message: Message) -> Self {
        Frame::new(message.type_id, message.payload)
    }
}
