mod common;

use common::{affine_frame, device_for, session_wcs_gwcs, session_wcs_nowcs, session_wcs_wcs};
use framelink::collection::Dataset;
use framelink::error::FramelinkError;
use framelink::frame::AffineWcs;
use framelink::link::{parse_fallback, FallbackScheme, LinkKind, LinkOptions, LinkStatus, LinkType};
use framelink::orient::DEFAULT_ORIENTATION_LABEL;
use framelink::session::{Session, DEFAULT_VIEWER_ID};

fn wcs_options(fallback: Option<FallbackScheme>, error_on_fail: bool) -> LinkOptions {
    LinkOptions {
        link_type: LinkType::Wcs,
        wcs_fallback_scheme: fallback,
        wcs_use_affine: true,
        error_on_fail,
    }
}

#[test]
fn pixel_linking_always_succeeds() {
    let session = session_wcs_wcs();
    let links = session.links();
    assert_eq!(links.link_type(), LinkType::Pixels);
    assert_eq!(links.reference(), Some("has_wcs_1[SCI,1]"));
    assert_eq!(links.len(), 1);
    assert_eq!(
        session.get_link_type("has_wcs_2[SCI,1]").unwrap(),
        LinkStatus::Pixels
    );
    assert_eq!(
        session.get_link_type("has_wcs_1[SCI,1]").unwrap(),
        LinkStatus::SelfLink
    );
}

#[test]
fn wcs_linking_creates_default_orientation_and_affine_links() {
    let mut session = session_wcs_wcs();
    session.link_data(wcs_options(None, true)).unwrap();

    let links = session.links();
    assert_eq!(links.reference(), Some(DEFAULT_ORIENTATION_LABEL));
    assert_eq!(links.len(), 2);
    for label in ["has_wcs_1[SCI,1]", "has_wcs_2[SCI,1]"] {
        let link = links.link_for(label).unwrap();
        assert!(
            matches!(link.kind, LinkKind::Affine | LinkKind::Offset),
            "expected affine approximation for {label}, got {:?}",
            link.kind
        );
    }
    assert_eq!(
        session
            .get_link_type_between(DEFAULT_ORIENTATION_LABEL, "has_wcs_2[SCI,1]")
            .unwrap(),
        LinkStatus::Wcs
    );
}

#[test]
fn wcs_linking_without_affine_keeps_full_links() {
    let mut session = session_wcs_wcs();
    let options = LinkOptions {
        wcs_use_affine: false,
        ..wcs_options(None, true)
    };
    session.link_data(options).unwrap();
    for label in ["has_wcs_1[SCI,1]", "has_wcs_2[SCI,1]"] {
        assert_eq!(
            session.links().link_for(label).unwrap().kind,
            LinkKind::GeneralWcs
        );
        assert_eq!(session.get_link_type(label).unwrap(), LinkStatus::Wcs);
    }
}

#[test]
fn affine_approximation_agrees_with_direct_conversion() {
    let mut session = session_wcs_wcs();
    session.link_data(wcs_options(None, true)).unwrap();

    // Carry a pixel of the second image into the first through the link
    // graph, then compare with direct per-dataset WCS conversion.
    let linked = session
        .links()
        .transform(
            session.collection(),
            "has_wcs_2[SCI,1]",
            "has_wcs_1[SCI,1]",
            4.0,
            7.0,
        )
        .unwrap();
    let second = session.collection().get("has_wcs_2[SCI,1]").unwrap();
    let first = session.collection().get("has_wcs_1[SCI,1]").unwrap();
    let world = second.adapter.pixel_to_world(4.0, 7.0).unwrap();
    let (dx, dy) = first.adapter.world_to_pixel(world).unwrap();
    // 0.1 px at the fixture plate scale is 1e-5 degrees on the sky.
    assert!((linked.x - dx).abs() < 0.1);
    assert!((linked.y - dy).abs() < 0.1);
}

#[test]
fn wcs_fallback_pixel_links_datasets_without_wcs() {
    let mut session = session_wcs_nowcs();
    session
        .link_data(wcs_options(Some(FallbackScheme::Pixels), true))
        .unwrap();

    assert_eq!(
        session.get_link_type("no_wcs[SCI,1]").unwrap(),
        LinkStatus::Pixels
    );
    assert_eq!(
        session.get_link_type("has_wcs[SCI,1]").unwrap(),
        LinkStatus::Wcs
    );
    assert_eq!(
        session.get_link_type(DEFAULT_ORIENTATION_LABEL).unwrap(),
        LinkStatus::SelfLink
    );
}

#[test]
fn wcs_without_fallback_fails_silently_by_default() {
    let mut session = session_wcs_nowcs();
    session.link_data(wcs_options(None, false)).unwrap();

    // The previous pixel links are kept untouched, and the failed attempt
    // leaves no synthetic orientation layer behind.
    let links = session.links();
    assert_eq!(links.link_type(), LinkType::Pixels);
    assert_eq!(links.reference(), Some("has_wcs[SCI,1]"));
    assert!(session.collection().get(DEFAULT_ORIENTATION_LABEL).is_none());
}

#[test]
fn wcs_without_fallback_raises_when_asked() {
    let mut session = session_wcs_nowcs();
    let err = session.link_data(wcs_options(None, true)).unwrap_err();
    assert!(
        matches!(err, FramelinkError::MissingCoordinateFrame { .. }),
        "unexpected error: {err}"
    );
    assert!(err.to_string().contains("valid WCS"));
    // No partial application.
    assert_eq!(session.links().link_type(), LinkType::Pixels);
}

#[test]
fn non_celestial_wcs_is_not_wcs_linkable() {
    let mut session = Session::new();
    session
        .load_dataset(Dataset::filled(
            "has_wcs[SCI,1]",
            (10, 10),
            0.0,
            "",
            affine_frame([0.0, 0.0]),
        ))
        .unwrap();
    session
        .load_dataset(Dataset::filled(
            "bad_wcs[SCI,1]",
            (10, 10),
            0.0,
            "",
            framelink::frame::FrameAdapter::Affine(AffineWcs::non_celestial(
                [0.0, 0.0],
                [[1.0, 0.0], [0.0, 1.0]],
            )),
        ))
        .unwrap();

    session
        .link_data(wcs_options(Some(FallbackScheme::Pixels), true))
        .unwrap();
    assert_eq!(
        session.get_link_type("bad_wcs[SCI,1]").unwrap(),
        LinkStatus::Pixels
    );
    assert_eq!(
        session.get_link_type("has_wcs[SCI,1]").unwrap(),
        LinkStatus::Wcs
    );
}

#[test]
fn invalid_parameters_are_rejected() {
    let err = LinkType::parse("foo").unwrap_err();
    assert!(err.to_string().contains("link_type"));

    let err = parse_fallback("foo").unwrap_err();
    assert!(err.to_string().contains("wcs_fallback_scheme"));

    let session = session_wcs_wcs();
    let err = session.get_link_type("foo").unwrap_err();
    assert!(err
        .to_string()
        .contains("not found in data collection external links"));
}

#[test]
fn pair_lookup_names_both_labels() {
    let session = session_wcs_wcs();
    let err = session
        .get_link_type_between("has_wcs_2[SCI,1]", "foo")
        .unwrap_err();
    let msg = err.to_string();
    assert!(msg.contains("'has_wcs_2[SCI,1]'") && msg.contains("'foo'"));
    assert!(msg.contains("combo not found"));
}

#[test]
fn empty_session_linking_is_a_noop() {
    let mut session = Session::new();
    session.link_data(LinkOptions::default()).unwrap();
    assert_eq!(session.links().len(), 0);

    let err = session.get_link_type("foo").unwrap_err();
    assert_eq!(err.to_string(), "No reference data for link look-up");
}

#[test]
fn markers_pin_the_link_type() {
    let mut session = session_wcs_wcs();
    session.add_marker(DEFAULT_VIEWER_ID, 0.0, 0.0).unwrap();

    let err = session.link_data(wcs_options(None, true)).unwrap_err();
    assert!(matches!(err, FramelinkError::UnsafeStateTransition(_)));
    assert!(err.to_string().contains("cannot change linking"));
    // Fully rejected: still pixel-linked.
    assert_eq!(session.links().link_type(), LinkType::Pixels);

    // Relinking under the same scheme stays possible.
    session.link_data(LinkOptions::default()).unwrap();

    session.clear_markers();
    session.link_data(wcs_options(None, true)).unwrap();
    assert_eq!(session.links().link_type(), LinkType::Wcs);
}

#[test]
fn notices_record_link_and_reference_changes() {
    use framelink::notify::Notice;

    let mut session = session_wcs_wcs();
    session.take_notices();

    session.link_data(wcs_options(None, true)).unwrap();
    let notices = session.take_notices();
    assert!(notices.iter().any(|n| matches!(
        n,
        Notice::LinkUpdated {
            link_type: LinkType::Wcs,
            ..
        }
    )));
    assert!(notices
        .iter()
        .any(|n| matches!(n, Notice::RefDataChanged { .. })));
    assert!(session.take_notices().is_empty());
}

#[test]
fn zoom_limits_become_a_rotated_quad_for_rotated_frames() {
    let mut session = session_wcs_gwcs();
    session
        .link_data(wcs_options(Some(FallbackScheme::Pixels), true))
        .unwrap();

    let corners = session
        .zoom_limits(DEFAULT_VIEWER_ID, "gwcs[DATA]")
        .unwrap();
    // The viewer limits are axis-aligned in the reference frame; in the
    // 45-degree rotated frame no edge stays axis-aligned.
    let (x0, _) = corners[0];
    let (x1, _) = corners[1];
    let (_, y0) = corners[0];
    let (_, y3) = corners[3];
    assert!((x0 - x1).abs() > 0.5, "corners {corners:?}");
    assert!((y0 - y3).abs() > 0.5, "corners {corners:?}");
}

#[test]
fn device_positions_round_trip_through_the_link_graph() {
    let mut session = session_wcs_wcs();
    session.link_data(wcs_options(None, true)).unwrap();

    let (dx, dy) = device_for(&session, DEFAULT_VIEWER_ID, "has_wcs_2[SCI,1]", 1.0, 0.0);
    let reference = session
        .viewer(DEFAULT_VIEWER_ID)
        .and_then(|s| s.reference.clone())
        .unwrap();
    let back = session
        .links()
        .transform(
            session.collection(),
            &reference,
            "has_wcs_2[SCI,1]",
            dx,
            dy,
        )
        .unwrap();
    assert!((back.x - 1.0).abs() < 1e-6);
    assert!((back.y - 0.0).abs() < 1e-6);
}
