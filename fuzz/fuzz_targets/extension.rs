#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use params::{
    ExtensionSlot, Handshake, Mode, Session, SessionState, Side, TransportParamsExtension,
};

#[derive(Arbitrary, Debug)]
struct Input {
    side: Side,
    opaque: bool,
    body: Vec<u8>,
}

fuzz_target!(|input: Input| {
    let mode = if input.opaque { Mode::Opaque } else { Mode::Structured };
    let ext = TransportParamsExtension::new(mode);
    let mut hs = Handshake::new(input.side);
    let slot = hs.peer_slot();
    let received = ext
        .on_extension_received(&mut hs, slot, &mut &input.body[..])
        .is_ok();
    assert_eq!(received, hs.store().is_populated(slot));
    assert!(!hs.store().is_populated(ExtensionSlot::written_by(input.side, hs.phase())));

    let mut session = SessionState::new();
    assert_eq!(ext.export_to_session(&mut hs, &mut session), received);
    assert_eq!(hs.is_exported(), received);
    assert!(!ext.export_to_session(&mut hs, &mut session));

    let exported = session.transport_parameters().cloned();
    if let (Some(params), Mode::Opaque) = (&exported, mode) {
        assert_eq!(params.as_bytes(), Some(&input.body[..]));
    }
    session.put_transport_parameters(params::PeerParameters::Opaque(Default::default()));
    if exported.is_some() {
        assert_eq!(session.transport_parameters().cloned(), exported);
    }
});
