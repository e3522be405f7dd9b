use radiodiag::radio::{
    GsmCell, NrCell, RadioCellRecord, Technology, UmtsCell, decode, gsm_band, gsm_frequency_hz,
};

#[test]
fn gsm_channel_zero_is_gsm900() {
    let d = decode(Technology::Gsm, 0, &[]);
    assert_eq!(d.band.as_deref(), Some("GSM-900"));
    // 935.2 + 0.2 * (0 - 975) MHz
    assert_eq!(d.frequency_hz, Some(740_200_000));
}

#[test]
fn gsm_band_edges() {
    assert_eq!(gsm_band(124), Some("GSM-900"));
    assert_eq!(gsm_band(125), None);
    assert_eq!(gsm_band(128), Some("GSM-850"));
    assert_eq!(gsm_band(251), Some("GSM-850"));
    assert_eq!(gsm_band(259), Some("GSM-450"));
    assert_eq!(gsm_band(340), Some("GSM-480"));
    assert_eq!(gsm_band(512), Some("DCS-1800"));
    assert_eq!(gsm_band(885), Some("DCS-1800"));
    assert_eq!(gsm_band(955), Some("E-GSM-900"));
    assert_eq!(gsm_band(1023), Some("E-GSM-900"));
    assert_eq!(gsm_band(1024), None);
}

#[test]
fn gsm_frequencies_per_band() {
    assert_eq!(gsm_frequency_hz(975), Some(935_200_000));
    assert_eq!(gsm_frequency_hz(512), Some(1_805_200_000));
    assert_eq!(gsm_frequency_hz(600), Some(1_822_800_000));
    assert_eq!(gsm_frequency_hz(128), Some(869_200_000));
    assert_eq!(gsm_frequency_hz(190), Some(881_600_000));
    // Bands without a formula, and channels outside every band.
    assert_eq!(gsm_frequency_hz(259), None);
    assert_eq!(gsm_frequency_hz(306), None);
    assert_eq!(gsm_frequency_hz(400), None);
}

#[test]
fn umts_band1_has_frequency() {
    let d = decode(Technology::Umts, 10562, &[]);
    assert_eq!(d.band.as_deref(), Some("Band 1"));
    assert_eq!(d.frequency_hz, Some(2_112_400_000));
}

#[test]
fn umts_outside_table_is_unknown() {
    let d = decode(Technology::Umts, 10839, &[]);
    assert_eq!(d.band.as_deref(), Some("unknown"));
    assert_eq!(d.frequency_hz, None);
}

#[test]
fn umts_other_bands_have_label_only() {
    for (n, band) in [(9700, "Band 2"), (1200, "Band 3"), (1600, "Band 4"), (4400, "Band 5")] {
        let d = decode(Technology::Umts, n, &[]);
        assert_eq!(d.band.as_deref(), Some(band), "uarfcn {n}");
        assert_eq!(d.frequency_hz, None, "uarfcn {n}");
    }
}

#[test]
fn lte_band3_inferred_from_range() {
    let d = decode(Technology::Lte, 1200, &[]);
    assert_eq!(d.band.as_deref(), Some("LTE Band 3"));
    assert_eq!(d.frequency_hz, Some(1_805_000_000));

    let d = decode(Technology::Lte, 1949, &[]);
    assert_eq!(d.frequency_hz, Some(1_879_900_000));
}

#[test]
fn lte_authoritative_band_wins() {
    let d = decode(Technology::Lte, 1300, &[20, 3]);
    assert_eq!(d.band.as_deref(), Some("LTE Band 20"));
    // Frequency still follows the channel range.
    assert_eq!(d.frequency_hz, Some(1_815_000_000));
}

#[test]
fn lte_other_ranges() {
    assert_eq!(decode(Technology::Lte, 0, &[]).band.as_deref(), Some("LTE Band 1"));
    assert_eq!(decode(Technology::Lte, 3000, &[]).band.as_deref(), Some("LTE Band 7"));
    assert_eq!(decode(Technology::Lte, 6300, &[]).band.as_deref(), Some("LTE Band 20"));
    assert_eq!(decode(Technology::Lte, 3000, &[]).frequency_hz, None);
    let d = decode(Technology::Lte, 9000, &[]);
    assert_eq!(d.band, None);
    assert_eq!(d.frequency_hz, None);
}

#[test]
fn nr_uses_authoritative_band_and_never_a_frequency() {
    let d = decode(Technology::Nr, 632_628, &[78]);
    assert_eq!(d.band.as_deref(), Some("n78"));
    assert_eq!(d.frequency_hz, None);

    let d = decode(Technology::Nr, 632_628, &[]);
    assert_eq!(d.band, None);
}

#[test]
fn uncovered_technology_is_absent() {
    let d = decode(Technology::Other, 42, &[]);
    assert_eq!(d.band, None);
    assert_eq!(d.frequency_hz, None);
}

#[test]
fn record_decoding_treats_zero_as_a_channel() {
    let rec = RadioCellRecord::Gsm(GsmCell {
        arfcn: Some(0),
        ..Default::default()
    })
    .decoded();
    assert_eq!(rec.band(), Some("GSM-900"));
    assert_eq!(rec.frequency_hz(), Some(740_200_000));
}

#[test]
fn record_without_channel_stays_undecoded() {
    let rec = RadioCellRecord::Umts(UmtsCell {
        lac: Some(7),
        ..Default::default()
    })
    .decoded();
    assert_eq!(rec.band(), None);
    assert_eq!(rec.frequency_hz(), None);
}

#[test]
fn nr_record_drops_any_supplied_frequency() {
    let rec = RadioCellRecord::Nr(NrCell {
        nrarfcn: Some(632_628),
        bands: vec![78],
        frequency_hz: Some(3_489_420_000),
        ..Default::default()
    })
    .decoded();
    assert_eq!(rec.band(), Some("n78"));
    assert_eq!(rec.frequency_hz(), None);
}

#[test]
fn detail_fields_only_list_present_values() {
    let rec = RadioCellRecord::Gsm(GsmCell {
        lac: Some(0),
        arfcn: Some(17),
        ..Default::default()
    });
    let names: Vec<&str> = rec.detail_fields().iter().map(|(n, _)| *n).collect();
    assert_eq!(names, vec!["LAC", "ARFCN"]);
}
