//! GlobalPlatform host application
//!
//! [`GlobalPlatform`] drives one card through one transport: it selects the
//! Security Domain, runs the mutual-authentication handshake, owns the
//! secure-channel wrapper, and exposes the privileged card-management
//! operations. A channel is owned by exactly one caller; every exchange is
//! a synchronous request/response and the MAC chain totally orders them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, trace, warn};

use crate::aid::Aid;
use crate::command::Command;
use crate::commands;
use crate::commands::install::load_file_parameters;
use crate::constants::{
    DEFAULT_KEY, DEFAULT_LOAD_SIZE, HOST_CHALLENGE_LENGTH, get_status_p1, get_status_p2, sd_aids,
    status,
};
use crate::crypto::{NULL_BYTES_8, mac_full_3des};
use crate::keys::{Diversification, KeySet, KeyType};
use crate::load::LoadCommandStream;
use crate::registry::{AidRegistry, parse_records};
use crate::response::{Response, StatusWord};
use crate::scp::ScpVariant;
use crate::secure_channel::{SecureChannelWrapper, SecurityLevel};
use crate::session::{Session, derive_session_keys_scp02};
use crate::transport::CardTransport;
use crate::{Error, Result};

/// Observer of every APDU exchange, in send order
///
/// Listeners are effect-free sinks: they see the wire bytes of each command
/// and response plus the round-trip time, and must not re-enter the host.
pub trait ApduListener {
    /// Called after each exchange completes
    fn exchanged_apdu(&mut self, command: &[u8], response: &[u8], elapsed: Duration);
}

/// Progress callback for LOAD sequences: (blocks sent, total blocks)
pub type LoadCallback<'a> = &'a mut dyn FnMut(usize, usize);

/// GlobalPlatform card management host
pub struct GlobalPlatform<T: CardTransport> {
    transport: T,
    sd_aid: Option<Aid>,
    keys: HashMap<u8, KeySet>,
    wrapper: Option<SecureChannelWrapper>,
    /// Variant fixed at construction for implicitly initiated channels,
    /// or remembered from the last handshake
    variant: Option<ScpVariant>,
    listeners: Vec<Box<dyn ApduListener>>,
    invalidated: bool,
}

impl<T: CardTransport> GlobalPlatform<T> {
    /// Create a host over a transport; the SCP variant is negotiated later
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            sd_aid: None,
            keys: HashMap::new(),
            wrapper: None,
            variant: None,
            listeners: Vec::new(),
            invalidated: false,
        }
    }

    /// Create a host for an implicitly initiated SCP02 channel
    ///
    /// Only the implicit variants can be fixed up front; explicit channels
    /// are negotiated by [`GlobalPlatform::open_secure_channel`].
    pub fn with_implicit_variant(transport: T, variant: ScpVariant) -> Result<Self> {
        if !variant.is_implicit() {
            return Err(Error::Config(
                "only implicit variants can be set at construction",
            ));
        }
        let mut host = Self::new(transport);
        host.variant = Some(variant);
        Ok(host)
    }

    /// Register an APDU listener
    pub fn add_listener(&mut self, listener: Box<dyn ApduListener>) {
        self.listeners.push(listener);
    }

    /// Drop all registered listeners
    pub fn clear_listeners(&mut self) {
        self.listeners.clear();
    }

    /// Define a static key set
    pub fn set_keys(
        &mut self,
        index: u8,
        enc: [u8; 16],
        mac: [u8; 16],
        kek: [u8; 16],
        diversification: Diversification,
    ) {
        self.keys.insert(
            index,
            KeySet::with_diversification(enc, mac, kek, diversification),
        );
    }

    /// Replace one key of a key set, creating the set if absent
    pub fn set_key(&mut self, index: u8, id: u8, key_type: KeyType, key: &[u8]) -> Result<()> {
        self.keys
            .entry(index)
            .or_insert_with(|| KeySet::from_single_key([0u8; 16]))
            .set_key(id, key_type, key)
    }

    /// The currently selected Security Domain AID
    pub fn sd_aid(&self) -> Option<&Aid> {
        self.sd_aid.as_ref()
    }

    /// Whether a secure channel is currently established
    pub fn is_secure_channel_open(&self) -> bool {
        self.wrapper.is_some()
    }

    /// The security level of the open channel, or clear
    pub fn security_level(&self) -> SecurityLevel {
        self.wrapper
            .as_ref()
            .map_or(SecurityLevel::CLEAR, |w| w.security_level())
    }

    /// The transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Discard the secure channel and clear the invalidation latch
    pub fn close_secure_channel(&mut self) {
        self.wrapper = None;
        self.invalidated = false;
    }

    /// Select the Security Domain
    ///
    /// With an explicit AID that AID must answer; without one the
    /// well-known Security Domains are tried in a fixed order and the first
    /// one answering 9000 wins.
    pub fn select_security_domain(&mut self, aid: Option<&Aid>) -> Result<()> {
        if let Some(aid) = aid {
            let response = self.exchange(&commands::select_by_name(aid.as_bytes()))?;
            if !response.is_success() {
                return Err(Error::SelectionFailed(response.status()));
            }
            debug!(sd = %aid, "selected Security Domain");
            self.sd_aid = Some(aid.clone());
            return Ok(());
        }

        let mut last_sw = StatusWord::new(0x6A, 0x82);
        for &(name, bytes) in sd_aids::KNOWN {
            let response = self.exchange(&commands::select_by_name(bytes))?;
            last_sw = response.status();
            if response.is_success() {
                debug!(sd = name, "selected Security Domain");
                self.sd_aid = Some(Aid::new(bytes)?);
                return Ok(());
            }
            trace!(sd = name, sw = %last_sw, "Security Domain not selectable");
        }
        Err(Error::SelectionFailed(last_sw))
    }

    /// Run the explicit secure-channel handshake
    ///
    /// `variant` of `None` negotiates SCP02 i=15 or SCP01 i=05 from the
    /// card's INITIALIZE UPDATE reply. The RMAC bit is dropped when the
    /// negotiated protocol is SCP01. With `gemalto` set and the Gemalto
    /// Security Domain selected, the static keys are first diversified
    /// from card production data.
    pub fn open_secure_channel(
        &mut self,
        key_set: u8,
        key_id: u8,
        variant: Option<ScpVariant>,
        level: SecurityLevel,
        gemalto: bool,
    ) -> Result<()> {
        if let Some(v) = variant {
            if v.is_implicit() {
                return Err(Error::Config(
                    "implicit variants cannot be opened explicitly",
                ));
            }
        }
        if key_set > 127 && key_set != 255 {
            return Err(Error::Config("key set id out of range"));
        }
        if key_set == 255 {
            // Observed in the field as an alias of the default set; the
            // specification only defines set 0
            warn!("key set 255 requested; treating as the default key set");
        }
        if !self.keys.contains_key(&key_set) {
            return Err(Error::Config("key set not defined"));
        }

        let mut level = level;
        if level.enc() {
            level = level.with_mac();
        }

        if gemalto {
            self.diversify_gemalto(key_set)?;
        }

        let mut host_challenge = [0u8; HOST_CHALLENGE_LENGTH];
        rand::RngCore::fill_bytes(&mut rand::rng(), &mut host_challenge);

        let response = self.exchange(&commands::initialize_update(
            key_set,
            key_id,
            &host_challenge,
        ))?;
        response.require_success("INITIALIZE UPDATE")?;
        let init_data = response.data();
        if init_data.len() != 28 {
            return Err(Error::ProtocolMismatch(
                "wrong INITIALIZE UPDATE response length",
            ));
        }

        let chosen = variant.unwrap_or(if init_data[11] == 2 {
            ScpVariant::Scp02_15
        } else {
            ScpVariant::Scp01_05
        });
        if chosen.major() == 1 && level.rmac() {
            level = level.without_rmac();
        }

        let static_keys = self
            .keys
            .get_mut(&key_set)
            .ok_or(Error::Config("key set not defined"))?;

        // Default key sets diversify from the card's identity bytes
        if key_set == 0 || key_set == 255 {
            static_keys.diversify(init_data)?;
        }
        if key_set > 0 && key_set != 255 && init_data[10] != key_set {
            return Err(Error::ProtocolMismatch("key set mismatch"));
        }

        let session = Session::new(static_keys, chosen, init_data, &host_challenge)?;
        let host_cryptogram = session.host_cryptogram()?;

        let mut wrapper =
            SecureChannelWrapper::new(session.into_keys(), chosen, SecurityLevel::MAC);
        let ext_auth = wrapper.wrap(&commands::external_authenticate(level, &host_cryptogram))?;
        let response = self.exchange(&ext_auth)?;
        if !response.is_success() {
            return Err(Error::AuthenticationFailed(
                "EXTERNAL AUTHENTICATE rejected by the card",
            ));
        }

        wrapper.set_security_level(level);
        if level.rmac() {
            wrapper.seed_response_icv();
        }
        self.wrapper = Some(wrapper);
        self.variant = Some(chosen);
        self.invalidated = false;
        debug!(variant = %chosen, level = level.bits(), "secure channel established");
        Ok(())
    }

    /// Select the card manager and open a MAC-only channel with the
    /// well-known default test keys
    pub fn open_with_default_keys(&mut self) -> Result<()> {
        self.select_security_domain(None)?;
        self.set_keys(
            0,
            DEFAULT_KEY,
            DEFAULT_KEY,
            DEFAULT_KEY,
            Diversification::None,
        );
        self.open_secure_channel(0, 0, None, SecurityLevel::MAC, false)
    }

    /// Transmit a command through the secure channel
    ///
    /// Lazily initiates implicit SCP02 channels on first use. Once the
    /// channel has been invalidated by a transport or verification failure,
    /// every call fails with [`Error::ChannelClosed`] until a fresh
    /// handshake succeeds.
    pub fn transmit(&mut self, command: &Command) -> Result<Response> {
        if self.invalidated {
            return Err(Error::ChannelClosed);
        }

        if self.wrapper.is_none() {
            if let Some(variant) = self.variant.filter(|v| v.is_implicit()) {
                self.initiate_implicit_channel(variant)?;
            }
        }

        let outgoing = match self.wrapper.as_mut() {
            Some(wrapper) => wrapper.wrap(command)?,
            None => command.clone(),
        };
        let response = self.exchange(&outgoing)?;

        match self.wrapper.as_mut() {
            Some(wrapper) => match wrapper.unwrap(response) {
                Ok(unwrapped) => Ok(unwrapped),
                Err(e) => {
                    self.invalidate();
                    Err(e)
                }
            },
            None => Ok(response),
        }
    }

    /// INSTALL [for load] of a package
    pub fn install_for_load(
        &mut self,
        package_aid: &Aid,
        security_domain: Option<&Aid>,
        hash: &[u8],
        load_params: &[u8],
    ) -> Result<()> {
        let sd = security_domain
            .or(self.sd_aid.as_ref())
            .ok_or(Error::Config("no Security Domain selected"))?
            .clone();
        let response = self.transmit(&commands::for_load(package_aid, &sd, hash, load_params))?;
        response.require_success("INSTALL [for load]")?;
        Ok(())
    }

    /// Send a load file as a LOAD block sequence
    ///
    /// The block size defaults to 255 and is reduced by the secure-channel
    /// overhead of the active security level.
    pub fn load(
        &mut self,
        load_data: &[u8],
        block_size: Option<usize>,
        mut callback: Option<LoadCallback<'_>>,
    ) -> Result<()> {
        let configured = block_size.unwrap_or(DEFAULT_LOAD_SIZE).min(DEFAULT_LOAD_SIZE);
        let overhead = self.wrapper.as_ref().map_or(0, |w| w.wrap_overhead());
        let mut stream = LoadCommandStream::new(load_data, configured.saturating_sub(overhead))?;

        while let Some((is_last, block_number, block)) = stream.next_block() {
            let response = self.transmit(&commands::load_block(is_last, block_number, block))?;
            response.require_success("LOAD")?;
            if let Some(cb) = callback.as_mut() {
                cb(stream.current_block(), stream.blocks_count());
            }
        }
        debug!(blocks = stream.blocks_count(), "load file transferred");
        Ok(())
    }

    /// INSTALL [for load] followed by the LOAD sequence
    ///
    /// With `with_params` the load parameters advertise the code length;
    /// `hash` is empty unless a load-file hash check is wanted.
    pub fn load_package(
        &mut self,
        package_aid: &Aid,
        load_data: &[u8],
        with_params: bool,
        hash: &[u8],
        block_size: Option<usize>,
    ) -> Result<()> {
        let params = if with_params {
            load_file_parameters(load_data.len()).to_vec()
        } else {
            Vec::new()
        };
        self.install_for_load(package_aid, None, hash, &params)?;
        self.load(load_data, block_size, None)
    }

    /// INSTALL [for install and make selectable]
    ///
    /// The instance AID defaults to the applet AID, the install parameters
    /// to the empty `C9 00` block, and the token to empty.
    pub fn install_and_make_selectable(
        &mut self,
        package_aid: &Aid,
        applet_aid: &Aid,
        instance_aid: Option<&Aid>,
        privileges: u8,
        install_params: Option<&[u8]>,
        install_token: &[u8],
    ) -> Result<()> {
        let instance = instance_aid.unwrap_or(applet_aid);
        let params = install_params.unwrap_or(&[0xC9, 0x00]);
        let response = self.transmit(&commands::for_install_and_make_selectable(
            package_aid,
            applet_aid,
            instance,
            privileges,
            params,
            install_token,
        ))?;
        response.require_success("INSTALL [for install and make selectable]")?;
        Ok(())
    }

    /// DELETE an object, optionally cascading to dependent objects
    pub fn delete_aid(&mut self, aid: &Aid, delete_related: bool) -> Result<()> {
        let response = self.transmit(&commands::delete_object(aid, delete_related))?;
        response.require_success("DELETE")?;
        Ok(())
    }

    /// Read a data object from the selected application
    pub fn get_data(&mut self, p1: u8, p2: u8) -> Result<Response> {
        self.transmit(&commands::get_data(p1, p2).with_le(0))
    }

    /// Read the full card content registry
    ///
    /// Sweeps the issuer-domain and application categories, then the
    /// load-file categories (the plain one only when the with-modules query
    /// is not supported). 6310 continuations are followed per category and
    /// the records concatenated in receive order.
    pub fn get_status(&mut self) -> Result<AidRegistry> {
        let mut registry = AidRegistry::new();

        for p1 in [
            get_status_p1::ISSUER_SECURITY_DOMAIN,
            get_status_p1::APPLICATIONS,
        ] {
            self.get_status_category(p1, &mut registry)?;
        }

        let mut with_modules = false;
        for p1 in [
            get_status_p1::EXEC_LOAD_FILES_AND_MODULES,
            get_status_p1::EXEC_LOAD_FILES,
        ] {
            if with_modules {
                continue;
            }
            if self.get_status_category(p1, &mut registry)?
                && p1 == get_status_p1::EXEC_LOAD_FILES_AND_MODULES
            {
                with_modules = true;
            }
        }

        Ok(registry)
    }

    /// One GET STATUS category; returns whether the card supports it
    fn get_status_category(&mut self, p1: u8, registry: &mut AidRegistry) -> Result<bool> {
        let mut records = Vec::new();

        let response = self.transmit(&commands::get_status(p1, get_status_p2::FIRST))?;
        let mut sw = response.status();
        if !sw.is_success() && sw != status::MORE_RECORDS {
            trace!(p1, sw = %sw, "GET STATUS category not supported");
            return Ok(false);
        }
        records.extend_from_slice(response.data());

        while sw == status::MORE_RECORDS {
            let response = self.transmit(&commands::get_status(p1, get_status_p2::NEXT))?;
            records.extend_from_slice(response.data());
            sw = response.status();
            if !sw.is_success() && sw != status::MORE_RECORDS {
                return Err(Error::CardStatus {
                    operation: "GET STATUS",
                    status: sw,
                });
            }
        }

        parse_records(&records, p1, registry)?;
        Ok(true)
    }

    /// Gemalto pre-handshake diversification from card production data
    fn diversify_gemalto(&mut self, key_set: u8) -> Result<()> {
        let is_gemalto = self
            .sd_aid
            .as_ref()
            .is_some_and(|aid| aid.as_bytes() == sd_aids::GEMALTO);
        if !is_gemalto {
            return Ok(());
        }

        let response = self.exchange(&commands::get_data(0x9F, 0x7F).with_le(0))?;
        let cplc = response.require_success("GET DATA")?;
        if cplc.len() < 19 {
            return Err(Error::InvalidResponse("short card production data"));
        }

        let mut seed = [0u8; 16];
        {
            let aid = self
                .sd_aid
                .as_ref()
                .ok_or(Error::Config("no Security Domain selected"))?
                .as_bytes();
            seed[0] = aid[aid.len() - 2];
            seed[1] = aid[aid.len() - 1];
            seed[4..8].copy_from_slice(&cplc[15..19]);
        }

        self.keys
            .get_mut(&key_set)
            .ok_or(Error::Config("key set not defined"))?
            .diversify(&seed)
    }

    /// Lazy initiation of an implicit SCP02 channel
    ///
    /// Reads the key-set id and the sequence counter from the card, derives
    /// the session keys in implicit mode, and seeds both ICVs from the
    /// Security Domain AID.
    fn initiate_implicit_channel(&mut self, variant: ScpVariant) -> Result<()> {
        let sd_aid = self
            .sd_aid
            .clone()
            .ok_or(Error::Config("no Security Domain selected"))?;

        let key_info = self.exchange(&commands::get_data(0x00, 0xE0))?.to_bytes();
        let key_set = if key_info.len() > 6 {
            key_info[if key_info[0] != 0 { 5 } else { 6 }]
        } else {
            0
        };

        let seq_response = self.exchange(&commands::get_data(0x00, 0xC1))?;
        seq_response.require_success("GET DATA")?;
        let seq_bytes = seq_response.to_bytes();
        if seq_bytes.len() < 4 {
            return Err(Error::InvalidResponse("short sequence counter"));
        }
        let seq = [seq_bytes[2], seq_bytes[3]];

        let static_keys = self
            .keys
            .get(&key_set)
            .ok_or(Error::Config("key set not defined"))?;
        let keys = derive_session_keys_scp02(static_keys, &seq, true)?;

        let icv = mac_full_3des(keys.mac(), &NULL_BYTES_8, sd_aid.as_bytes())?;
        let rmac_key = keys
            .rmac()
            .ok_or(Error::Crypto("implicit channel requires a response-MAC key"))?;
        let ricv = mac_full_3des(rmac_key, &NULL_BYTES_8, sd_aid.as_bytes())?;

        self.wrapper = Some(SecureChannelWrapper::with_icv(
            keys,
            variant,
            SecurityLevel::MAC,
            icv,
            ricv,
        ));
        debug!(variant = %variant, "implicit secure channel initiated");
        Ok(())
    }

    fn exchange(&mut self, command: &Command) -> Result<Response> {
        let bytes = command.to_bytes();
        let start = Instant::now();
        let raw = match self.transport.transmit_raw(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                self.invalidate();
                return Err(e.into());
            }
        };
        let elapsed = start.elapsed();

        for listener in &mut self.listeners {
            listener.exchanged_apdu(&bytes, &raw, elapsed);
        }

        match Response::from_bytes(&raw) {
            Ok(response) => Ok(response),
            Err(e) => {
                self.invalidate();
                Err(e)
            }
        }
    }

    fn invalidate(&mut self) {
        self.wrapper = None;
        self.invalidated = true;
    }
}

impl<T: CardTransport> std::fmt::Debug for GlobalPlatform<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalPlatform")
            .field("sd_aid", &self.sd_aid)
            .field("secure_channel", &self.wrapper)
            .field("invalidated", &self.invalidated)
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{GEMALTO_MOTHER_KEY, load_p1};
    use crate::crypto::mac_3des;
    use crate::registry::EntryKind;
    use crate::transport::TransportError;
    use bytes::Bytes;
    use hex_literal::hex;

    /// Replays a scripted list of responses and records every command
    #[derive(Debug, Default)]
    struct ScriptedTransport {
        commands: Vec<Vec<u8>>,
        responses: Vec<Vec<u8>>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Vec<u8>>) -> Self {
            Self {
                commands: Vec::new(),
                responses,
            }
        }
    }

    impl CardTransport for ScriptedTransport {
        fn do_transmit_raw(
            &mut self,
            command: &[u8],
        ) -> std::result::Result<Bytes, TransportError> {
            self.commands.push(command.to_vec());
            if self.responses.is_empty() {
                return Err(TransportError::Transmission);
            }
            Ok(Bytes::from(self.responses.remove(0)))
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    /// An SCP02 card model that answers the handshake correctly
    #[derive(Debug)]
    struct MockScp02Card {
        statics: KeySet,
        seq: [u8; 2],
        card_challenge: [u8; 6],
        commands: Vec<Vec<u8>>,
    }

    impl MockScp02Card {
        fn new(statics: KeySet) -> Self {
            Self {
                statics,
                seq: hex!("000d"),
                card_challenge: hex!("e9c62ba1c4c8"),
                commands: Vec::new(),
            }
        }
    }

    impl CardTransport for MockScp02Card {
        fn do_transmit_raw(
            &mut self,
            command: &[u8],
        ) -> std::result::Result<Bytes, TransportError> {
            self.commands.push(command.to_vec());
            let response = match (command[0], command[1]) {
                (0x80, 0x50) => {
                    let mut host_challenge = [0u8; 8];
                    host_challenge.copy_from_slice(&command[5..13]);

                    let session =
                        derive_session_keys_scp02(&self.statics, &self.seq, false).unwrap();
                    let mut input = [0u8; 16];
                    input[..8].copy_from_slice(&host_challenge);
                    input[8..10].copy_from_slice(&self.seq);
                    input[10..].copy_from_slice(&self.card_challenge);
                    let cryptogram = mac_3des(session.enc(), &NULL_BYTES_8, &input).unwrap();

                    let mut out = vec![0u8; 10];
                    out.push(0x20); // key information
                    out.push(0x02);
                    out.extend_from_slice(&self.seq);
                    out.extend_from_slice(&self.card_challenge);
                    out.extend_from_slice(&cryptogram);
                    out.extend_from_slice(&hex!("9000"));
                    out
                }
                _ => hex!("9000").to_vec(),
            };
            Ok(Bytes::from(response))
        }

        fn is_connected(&self) -> bool {
            true
        }
    }

    struct CountingListener {
        seen: std::rc::Rc<std::cell::RefCell<usize>>,
    }

    impl ApduListener for CountingListener {
        fn exchanged_apdu(&mut self, _command: &[u8], _response: &[u8], _elapsed: Duration) {
            *self.seen.borrow_mut() += 1;
        }
    }

    fn default_key_set() -> KeySet {
        KeySet::from_single_key(DEFAULT_KEY)
    }

    #[test]
    fn test_select_tries_known_security_domains() {
        let transport =
            ScriptedTransport::new(vec![hex!("6A82").to_vec(), hex!("9000").to_vec()]);
        let mut gp = GlobalPlatform::new(transport);

        gp.select_security_domain(None).unwrap();
        assert_eq!(gp.sd_aid().unwrap().as_bytes(), sd_aids::OP201_A);

        let commands = &gp.transport().commands;
        assert_eq!(commands.len(), 2);
        assert_eq!(&commands[0][5..], sd_aids::GP211);
        assert_eq!(&commands[1][5..], sd_aids::OP201_A);
    }

    #[test]
    fn test_select_failure_reports_last_sw() {
        let transport = ScriptedTransport::new(vec![
            hex!("6A82").to_vec(),
            hex!("6A82").to_vec(),
            hex!("6A82").to_vec(),
            hex!("6999").to_vec(),
        ]);
        let mut gp = GlobalPlatform::new(transport);

        let err = gp.select_security_domain(None).unwrap_err();
        match err {
            Error::SelectionFailed(sw) => assert_eq!(sw.to_u16(), 0x6999),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_explicit_handshake_and_wrapped_commands() {
        let mut gp = GlobalPlatform::new(MockScp02Card::new(default_key_set()));

        let aid = Aid::new(sd_aids::GP211).unwrap();
        gp.select_security_domain(Some(&aid)).unwrap();
        gp.set_keys(0, DEFAULT_KEY, DEFAULT_KEY, DEFAULT_KEY, Diversification::None);
        gp.open_secure_channel(0, 0, None, SecurityLevel::MAC, false)
            .unwrap();

        assert!(gp.is_secure_channel_open());
        assert_eq!(gp.security_level(), SecurityLevel::MAC);

        // EXTERNAL AUTHENTICATE went out MACed: 8-byte cryptogram + 8-byte MAC
        let ext_auth = &gp.transport().commands[2];
        assert_eq!(ext_auth[0], 0x84);
        assert_eq!(ext_auth[1], 0x82);
        assert_eq!(ext_auth[4], 16);
        assert_eq!(ext_auth.len(), 21);

        // Subsequent privileged commands are wrapped too
        let target = Aid::new(hex!("A0000000030000")).unwrap();
        gp.delete_aid(&target, true).unwrap();
        let delete = gp.transport().commands.last().unwrap();
        assert_eq!(delete[0], 0x84);
        assert_eq!(delete[4] as usize, 9 + 8);
    }

    #[test]
    fn test_handshake_rejects_wrong_card_keys() {
        // A card holding different static keys cannot authenticate
        let statics = KeySet::from_single_key(hex!("505152535455565758595a5b5c5d5e5f"));
        let mut gp = GlobalPlatform::new(MockScp02Card::new(statics));

        let aid = Aid::new(sd_aids::GP211).unwrap();
        gp.select_security_domain(Some(&aid)).unwrap();
        gp.set_keys(0, DEFAULT_KEY, DEFAULT_KEY, DEFAULT_KEY, Diversification::None);
        let err = gp
            .open_secure_channel(0, 0, None, SecurityLevel::MAC, false)
            .unwrap_err();
        assert!(matches!(err, Error::AuthenticationFailed(_)));
        assert!(!gp.is_secure_channel_open());
    }

    #[test]
    fn test_enc_implies_mac() {
        let mut gp = GlobalPlatform::new(MockScp02Card::new(default_key_set()));

        let aid = Aid::new(sd_aids::GP211).unwrap();
        gp.select_security_domain(Some(&aid)).unwrap();
        gp.set_keys(0, DEFAULT_KEY, DEFAULT_KEY, DEFAULT_KEY, Diversification::None);
        gp.open_secure_channel(0, 0, None, SecurityLevel::ENC, false)
            .unwrap();

        let level = gp.security_level();
        assert!(level.mac() && level.enc());
    }

    #[test]
    fn test_open_rejects_bad_configuration() {
        let mut gp = GlobalPlatform::new(ScriptedTransport::new(Vec::new()));
        gp.set_keys(0, DEFAULT_KEY, DEFAULT_KEY, DEFAULT_KEY, Diversification::None);

        // Implicit variants cannot be opened explicitly
        let err = gp
            .open_secure_channel(0, 0, Some(ScpVariant::Scp02_1A), SecurityLevel::MAC, false)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        // Key set id out of range
        let err = gp
            .open_secure_channel(200, 0, None, SecurityLevel::MAC, false)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        // Undefined key set
        let err = gp
            .open_secure_channel(3, 0, None, SecurityLevel::MAC, false)
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_transport_failure_latches_channel_closed() {
        let transport = ScriptedTransport::new(vec![hex!("9000").to_vec()]);
        let mut gp = GlobalPlatform::new(transport);

        let cmd = commands::get_status(get_status_p1::APPLICATIONS, get_status_p2::FIRST);
        assert!(gp.transmit(&cmd).is_ok());

        // Script exhausted: the transport fails, the channel latches shut
        let err = gp.transmit(&cmd).unwrap_err();
        assert!(matches!(err, Error::Transport(_)));
        let err = gp.transmit(&cmd).unwrap_err();
        assert!(matches!(err, Error::ChannelClosed));
    }

    #[test]
    fn test_get_status_resumption_and_category_skip() {
        // Category 0x80: one complete record. Category 0x40: one record
        // split across a 6310 continuation. Category 0x10 succeeds, so
        // 0x20 is never queried.
        let transport = ScriptedTransport::new(vec![
            hex!("07A0000000030000 07 00 9000").to_vec(),
            hex!("08A000000003000001 0F 6310").to_vec(),
            hex!("80 9000").to_vec(),
            hex!("07A0000000030000 01 00 00 9000").to_vec(),
        ]);
        let mut gp = GlobalPlatform::new(transport);
        let registry = gp.get_status().unwrap();

        assert_eq!(registry.len(), 3);
        let entries = registry.entries();
        assert_eq!(entries[0].kind, EntryKind::IssuerSecurityDomain);
        assert_eq!(entries[1].kind, EntryKind::SecurityDomain);
        assert_eq!(entries[1].privileges, 0x80);
        assert_eq!(entries[2].kind, EntryKind::ExecutableLoadFileAndModules);

        let commands = &gp.transport().commands;
        assert_eq!(commands.len(), 4);
        // The continuation used P2=01
        assert_eq!(commands[2][2], get_status_p1::APPLICATIONS);
        assert_eq!(commands[2][3], get_status_p2::NEXT);
        // No 0x20 query after 0x10 succeeded
        assert_eq!(commands[3][2], get_status_p1::EXEC_LOAD_FILES_AND_MODULES);
    }

    #[test]
    fn test_load_chunks_and_numbers_blocks() {
        let transport = ScriptedTransport::new(vec![hex!("9000").to_vec(); 3]);
        let mut gp = GlobalPlatform::new(transport);

        let data = vec![0xAB_u8; 600];
        let mut progress = Vec::new();
        let mut callback = |sent: usize, total: usize| progress.push((sent, total));
        gp.load(&data, None, Some(&mut callback)).unwrap();

        let commands = &gp.transport().commands;
        assert_eq!(commands.len(), 3);
        assert_eq!(commands[0][2], load_p1::MORE_BLOCKS);
        assert_eq!(commands[0][3], 0);
        assert_eq!(commands[1][3], 1);
        assert_eq!(commands[2][2], load_p1::LAST_BLOCK);
        assert_eq!(commands[2][3], 2);
        // 255-byte blocks: 255 + 255 + 90
        assert_eq!(commands[0][4], 255);
        assert_eq!(commands[2][4], 90);
        assert_eq!(progress, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn test_load_failure_carries_status() {
        let transport =
            ScriptedTransport::new(vec![hex!("9000").to_vec(), hex!("6581").to_vec()]);
        let mut gp = GlobalPlatform::new(transport);

        let data = vec![0xAB_u8; 300];
        let err = gp.load(&data, None, None).unwrap_err();
        assert!(err.is_status(0x6581));
    }

    #[test]
    fn test_implicit_channel_lazy_initiation() {
        // select, GET DATA 00E0, GET DATA 00C1, then the wrapped command
        let transport = ScriptedTransport::new(vec![
            hex!("9000").to_vec(),
            hex!("E006C004000001029000").to_vec(),
            hex!("C10200059000").to_vec(),
            hex!("9000").to_vec(),
        ]);
        let mut gp =
            GlobalPlatform::with_implicit_variant(transport, ScpVariant::Scp02_1B).unwrap();
        gp.set_keys(0, DEFAULT_KEY, DEFAULT_KEY, DEFAULT_KEY, Diversification::None);

        let aid = Aid::new(sd_aids::GP211).unwrap();
        gp.select_security_domain(Some(&aid)).unwrap();

        let cmd = commands::get_status(get_status_p1::APPLICATIONS, get_status_p2::FIRST);
        let response = gp.transmit(&cmd).unwrap();
        assert!(response.is_success());
        assert!(gp.is_secure_channel_open());

        let commands = &gp.transport().commands;
        assert_eq!(commands.len(), 4);
        assert_eq!(&commands[1][..4], &hex!("80CA00E0"));
        assert_eq!(&commands[2][..4], &hex!("80CA00C1"));

        // Post-APDU MAC: class gains the secure-messaging bit, Lc grows by 8
        let wrapped = &commands[3];
        assert_eq!(wrapped[0], 0x84);
        assert_eq!(wrapped[4] as usize, 2 + 8);
        assert_eq!(wrapped.len(), 5 + 10);
    }

    #[test]
    fn test_implicit_constructor_rejects_explicit_variants() {
        let transport = ScriptedTransport::new(Vec::new());
        assert!(matches!(
            GlobalPlatform::with_implicit_variant(transport, ScpVariant::Scp02_15),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_gemalto_diversification_flow() {
        // The card model diversifies its keys the same way the host must:
        // seed from the SD AID tail and the 9F7F production data
        let seed = {
            let mut seed = [0u8; 16];
            seed[0] = 0x4D;
            seed[1] = 0x00;
            seed[4..8].copy_from_slice(&hex!("AABBCCDD"));
            seed
        };
        let mut card_statics = KeySet::with_diversification(
            GEMALTO_MOTHER_KEY,
            GEMALTO_MOTHER_KEY,
            GEMALTO_MOTHER_KEY,
            Diversification::Visa2,
        );
        card_statics.diversify(&seed).unwrap();

        struct GemaltoCard {
            inner: MockScp02Card,
        }
        impl CardTransport for GemaltoCard {
            fn do_transmit_raw(
                &mut self,
                command: &[u8],
            ) -> std::result::Result<Bytes, TransportError> {
                if command[..4] == hex!("80CA9F7F") {
                    self.inner.commands.push(command.to_vec());
                    let mut cplc = vec![0u8; 15];
                    cplc.extend_from_slice(&hex!("AABBCCDD"));
                    cplc.extend_from_slice(&[0u8; 23]);
                    cplc.extend_from_slice(&hex!("9000"));
                    return Ok(Bytes::from(cplc));
                }
                self.inner.do_transmit_raw(command)
            }

            fn is_connected(&self) -> bool {
                true
            }
        }

        let card = GemaltoCard {
            inner: MockScp02Card::new(card_statics),
        };
        let mut gp = GlobalPlatform::new(card);

        let aid = Aid::new(sd_aids::GEMALTO).unwrap();
        gp.select_security_domain(Some(&aid)).unwrap();
        // The mock reports key set 0x20 in its key information
        gp.set_keys(
            0x20,
            GEMALTO_MOTHER_KEY,
            GEMALTO_MOTHER_KEY,
            GEMALTO_MOTHER_KEY,
            Diversification::Visa2,
        );
        gp.open_secure_channel(0x20, 0, None, SecurityLevel::MAC, true)
            .unwrap();
        assert!(gp.is_secure_channel_open());
    }

    #[test]
    fn test_listener_sees_every_exchange_in_order() {
        let transport =
            ScriptedTransport::new(vec![hex!("9000").to_vec(), hex!("9000").to_vec()]);
        let mut gp = GlobalPlatform::new(transport);

        let seen = std::rc::Rc::new(std::cell::RefCell::new(0usize));
        gp.add_listener(Box::new(CountingListener { seen: seen.clone() }));

        let aid = Aid::new(sd_aids::GP211).unwrap();
        gp.select_security_domain(Some(&aid)).unwrap();
        gp.transmit(&commands::get_data(0x00, 0x66)).unwrap();

        assert_eq!(*seen.borrow(), 2);
    }

    #[test]
    fn test_install_defaults() {
        let transport = ScriptedTransport::new(vec![hex!("9000").to_vec()]);
        let mut gp = GlobalPlatform::new(transport);

        let package = Aid::new(hex!("A0000000030000")).unwrap();
        let applet = Aid::new(hex!("A000000003000001")).unwrap();
        gp.install_and_make_selectable(&package, &applet, None, 0x00, None, &[])
            .unwrap();

        let sent = &gp.transport().commands[0];
        // instance AID defaults to the applet AID, params to C9 00
        let data = &sent[5..];
        assert_eq!(&data[..8], hex!("07A0000000030000"));
        assert_eq!(&data[8..17], hex!("08A000000003000001"));
        assert_eq!(&data[17..26], hex!("08A000000003000001"));
        assert_eq!(&data[26..31], hex!("010002C900"));
        assert_eq!(data[31], 0x00);
    }

    #[test]
    fn test_install_for_load_requires_security_domain() {
        let transport = ScriptedTransport::new(Vec::new());
        let mut gp = GlobalPlatform::new(transport);
        let package = Aid::new(hex!("A0000000030000")).unwrap();
        let err = gp.install_for_load(&package, None, &[], &[]).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
