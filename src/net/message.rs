use uuid::Uuid;

use crate::net::packet::{PacketReader, PacketWriter};
use crate::skin::artifact::{PersonaPiece, PieceTintColour, Skin, SkinAnimation};

pub const PROTOCOL_VERSION: u32 = 1;

pub const MESSAGE_CLIENT_HELLO: u8 = 0x01;
pub const MESSAGE_HELLO_ACK: u8 = 0x02;
pub const MESSAGE_START_GAME: u8 = 0x0b;
pub const MESSAGE_SPAWN_READY: u8 = 0x0c;
pub const MESSAGE_SPAWN_ACK: u8 = 0x0d;
pub const MESSAGE_PLAYER_ROSTER: u8 = 0x3f;
pub const MESSAGE_PLAYER_SKIN: u8 = 0x5d;

const MAX_WIRE_STRING: usize = 8192;

/// Metadata an inbound client presents at hello time and the relay
/// re-presents when dialing the remote server on its behalf.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientData {
    pub identity: Uuid,
    pub display_name: String,
    pub skin_id: String,
}

/// The slice of game-start state the outbound session receives at dial
/// time and the inbound session needs for its own start handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct GameData {
    pub entity_id: u64,
    pub world_name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientHello {
    pub protocol_version: u32,
    pub key: String,
    pub client: ClientData,
    pub token: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HelloAck {
    pub accept: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RosterEntry {
    pub uuid: Uuid,
    pub display_name: String,
    pub skin: Skin,
}

/// One parsed protocol unit. Only the kinds the relay has to understand
/// are typed; everything else round-trips through `Raw` byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ClientHello(ClientHello),
    HelloAck(HelloAck),
    StartGame(GameData),
    SpawnReady,
    SpawnAck,
    PlayerRoster(Vec<RosterEntry>),
    PlayerSkin { uuid: Uuid, skin: Skin },
    Raw { id: u8, payload: Vec<u8> },
}

#[derive(Debug)]
pub struct MessageDecodeError {
    pub message: String,
}

impl std::fmt::Display for MessageDecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "message decode error: {}", self.message)
    }
}

impl std::error::Error for MessageDecodeError {}

fn decode_error(message: impl Into<String>) -> MessageDecodeError {
    MessageDecodeError {
        message: message.into(),
    }
}

impl Message {
    pub fn id(&self) -> u8 {
        match self {
            Message::ClientHello(_) => MESSAGE_CLIENT_HELLO,
            Message::HelloAck(_) => MESSAGE_HELLO_ACK,
            Message::StartGame(_) => MESSAGE_START_GAME,
            Message::SpawnReady => MESSAGE_SPAWN_READY,
            Message::SpawnAck => MESSAGE_SPAWN_ACK,
            Message::PlayerRoster(_) => MESSAGE_PLAYER_ROSTER,
            Message::PlayerSkin { .. } => MESSAGE_PLAYER_SKIN,
            Message::Raw { id, .. } => *id,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = PacketWriter::with_capacity(64);
        writer.write_u8(self.id());
        match self {
            Message::ClientHello(hello) => {
                writer.write_u32_le(hello.protocol_version);
                writer.write_string(&hello.key);
                write_client_data(&mut writer, &hello.client);
                writer.write_string(&hello.token);
            }
            Message::HelloAck(ack) => {
                writer.write_string(&ack.accept);
            }
            Message::StartGame(game) => {
                writer.write_u64_le(game.entity_id);
                writer.write_string(&game.world_name);
            }
            Message::SpawnReady | Message::SpawnAck => {}
            Message::PlayerRoster(entries) => {
                writer.write_u32_le(entries.len() as u32);
                for entry in entries {
                    writer.write_uuid(&entry.uuid);
                    writer.write_string(&entry.display_name);
                    write_skin(&mut writer, &entry.skin);
                }
            }
            Message::PlayerSkin { uuid, skin } => {
                writer.write_uuid(uuid);
                write_skin(&mut writer, skin);
            }
            Message::Raw { payload, .. } => {
                writer.write_bytes(payload);
            }
        }
        writer.into_vec()
    }

    pub fn decode(data: &[u8]) -> Result<Message, MessageDecodeError> {
        let mut reader = PacketReader::new(data);
        let id = reader
            .read_u8()
            .ok_or_else(|| decode_error("empty message"))?;
        let message = match id {
            MESSAGE_CLIENT_HELLO => {
                let protocol_version = reader
                    .read_u32_le()
                    .ok_or_else(|| decode_error("client hello missing protocol version"))?;
                let key = reader
                    .read_string(MAX_WIRE_STRING)
                    .ok_or_else(|| decode_error("client hello missing key"))?;
                let client = read_client_data(&mut reader)
                    .ok_or_else(|| decode_error("client hello missing client data"))?;
                let token = reader
                    .read_string(MAX_WIRE_STRING)
                    .ok_or_else(|| decode_error("client hello missing token"))?;
                Message::ClientHello(ClientHello {
                    protocol_version,
                    key,
                    client,
                    token,
                })
            }
            MESSAGE_HELLO_ACK => {
                let accept = reader
                    .read_string(MAX_WIRE_STRING)
                    .ok_or_else(|| decode_error("hello ack missing accept digest"))?;
                Message::HelloAck(HelloAck { accept })
            }
            MESSAGE_START_GAME => {
                let entity_id = reader
                    .read_u64_le()
                    .ok_or_else(|| decode_error("start game missing entity id"))?;
                let world_name = reader
                    .read_string(MAX_WIRE_STRING)
                    .ok_or_else(|| decode_error("start game missing world name"))?;
                Message::StartGame(GameData {
                    entity_id,
                    world_name,
                })
            }
            MESSAGE_SPAWN_READY => Message::SpawnReady,
            MESSAGE_SPAWN_ACK => Message::SpawnAck,
            MESSAGE_PLAYER_ROSTER => {
                let count = reader
                    .read_u32_le()
                    .ok_or_else(|| decode_error("roster missing entry count"))?;
                let mut entries = Vec::new();
                for index in 0..count {
                    let uuid = reader
                        .read_uuid()
                        .ok_or_else(|| decode_error(format!("roster entry {} missing uuid", index)))?;
                    let display_name = reader
                        .read_string(MAX_WIRE_STRING)
                        .ok_or_else(|| decode_error(format!("roster entry {} missing name", index)))?;
                    let skin = read_skin(&mut reader)
                        .ok_or_else(|| decode_error(format!("roster entry {} malformed skin", index)))?;
                    entries.push(RosterEntry {
                        uuid,
                        display_name,
                        skin,
                    });
                }
                Message::PlayerRoster(entries)
            }
            MESSAGE_PLAYER_SKIN => {
                let uuid = reader
                    .read_uuid()
                    .ok_or_else(|| decode_error("player skin missing uuid"))?;
                let skin = read_skin(&mut reader)
                    .ok_or_else(|| decode_error("player skin malformed skin"))?;
                Message::PlayerSkin { uuid, skin }
            }
            _ => {
                let payload = reader.read_bytes(reader.remaining()).unwrap_or(&[]).to_vec();
                return Ok(Message::Raw { id, payload });
            }
        };
        // Typed messages must consume their payload exactly; trailing
        // bytes would be silently dropped on re-encode and break the
        // forwarding transparency guarantee.
        if reader.remaining() != 0 {
            return Err(decode_error(format!(
                "message 0x{:02x} has {} trailing bytes",
                id,
                reader.remaining()
            )));
        }
        Ok(message)
    }
}

fn write_client_data(writer: &mut PacketWriter, client: &ClientData) {
    writer.write_uuid(&client.identity);
    writer.write_string(&client.display_name);
    writer.write_string(&client.skin_id);
}

fn read_client_data(reader: &mut PacketReader) -> Option<ClientData> {
    let identity = reader.read_uuid()?;
    let display_name = reader.read_string(MAX_WIRE_STRING)?;
    let skin_id = reader.read_string(MAX_WIRE_STRING)?;
    Some(ClientData {
        identity,
        display_name,
        skin_id,
    })
}

pub(crate) fn write_skin(writer: &mut PacketWriter, skin: &Skin) {
    writer.write_string(&skin.skin_id);
    writer.write_u32_le(skin.width);
    writer.write_u32_le(skin.height);
    writer.write_blob(&skin.pixel_data);
    writer.write_blob(&skin.geometry);
    writer.write_blob(&skin.resource_patch);
    writer.write_u32_le(skin.animations.len() as u32);
    for animation in &skin.animations {
        writer.write_u32_le(animation.width);
        writer.write_u32_le(animation.height);
        writer.write_blob(&animation.image);
        writer.write_u32_le(animation.animation_type);
        writer.write_u32_le(animation.frame_count);
    }
    writer.write_string(&skin.arm_size);
    writer.write_string(&skin.skin_colour);
    writer.write_u32_le(skin.persona_pieces.len() as u32);
    for piece in &skin.persona_pieces {
        writer.write_string(&piece.piece_id);
        writer.write_string(&piece.piece_type);
        writer.write_string(&piece.pack_id);
        writer.write_bool(piece.default_piece);
        writer.write_string(&piece.product_id);
    }
    writer.write_u32_le(skin.piece_tint_colours.len() as u32);
    for tint in &skin.piece_tint_colours {
        writer.write_string(&tint.piece_type);
        writer.write_u32_le(tint.colours.len() as u32);
        for colour in &tint.colours {
            writer.write_string(colour);
        }
    }
    writer.write_bool(skin.premium);
    writer.write_bool(skin.persona);
    writer.write_bool(skin.trusted);
}

pub(crate) fn read_skin(reader: &mut PacketReader) -> Option<Skin> {
    let skin_id = reader.read_string(MAX_WIRE_STRING)?;
    let width = reader.read_u32_le()?;
    let height = reader.read_u32_le()?;
    let pixel_data = reader.read_blob()?;
    let geometry = reader.read_blob()?;
    let resource_patch = reader.read_blob()?;
    let animation_count = reader.read_u32_le()?;
    let mut animations = Vec::new();
    for _ in 0..animation_count {
        let width = reader.read_u32_le()?;
        let height = reader.read_u32_le()?;
        let image = reader.read_blob()?;
        let animation_type = reader.read_u32_le()?;
        let frame_count = reader.read_u32_le()?;
        animations.push(SkinAnimation {
            width,
            height,
            image,
            animation_type,
            frame_count,
        });
    }
    let arm_size = reader.read_string(MAX_WIRE_STRING)?;
    let skin_colour = reader.read_string(MAX_WIRE_STRING)?;
    let piece_count = reader.read_u32_le()?;
    let mut persona_pieces = Vec::new();
    for _ in 0..piece_count {
        let piece_id = reader.read_string(MAX_WIRE_STRING)?;
        let piece_type = reader.read_string(MAX_WIRE_STRING)?;
        let pack_id = reader.read_string(MAX_WIRE_STRING)?;
        let default_piece = reader.read_bool()?;
        let product_id = reader.read_string(MAX_WIRE_STRING)?;
        persona_pieces.push(PersonaPiece {
            piece_id,
            piece_type,
            pack_id,
            default_piece,
            product_id,
        });
    }
    let tint_count = reader.read_u32_le()?;
    let mut piece_tint_colours = Vec::new();
    for _ in 0..tint_count {
        let piece_type = reader.read_string(MAX_WIRE_STRING)?;
        let colour_count = reader.read_u32_le()?;
        let mut colours = Vec::new();
        for _ in 0..colour_count {
            colours.push(reader.read_string(MAX_WIRE_STRING)?);
        }
        piece_tint_colours.push(PieceTintColour {
            piece_type,
            colours,
        });
    }
    let premium = reader.read_bool()?;
    let persona = reader.read_bool()?;
    let trusted = reader.read_bool()?;
    Some(Skin {
        skin_id,
        width,
        height,
        pixel_data,
        geometry,
        resource_patch,
        animations,
        persona_pieces,
        piece_tint_colours,
        arm_size,
        skin_colour,
        premium,
        persona,
        trusted,
    })
}
