//! Quality layer formation and layered decoding over whole sub-bands.

use ebcot_rs::{
    CinemaProfile, CodeBlock, CodeBlockSegment, CodeBlockStyle, CodingPass, DecodeParameters,
    DecodeStatus, EncodeParameters, PassType, SubbandOrientation, Tier1Decoder, Tier1Encoder,
    Tier1Error, decode_code_block, form_layers,
};

fn subband(width: u32, height: u32, seed: u32) -> Vec<i32> {
    let mut state = seed;
    (0..width * height)
        .map(|i| {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            let x = (i % width) as i32;
            let y = (i / width) as i32;
            let smooth = ((x * 7 + y * 5) % 120) - 60;
            let noise = (state % 33) as i32 - 16;
            if state % 5 == 0 { smooth * 4 + noise } else { noise / 2 }
        })
        .collect()
}

fn exact_truncation_parameters(layer_rates: Vec<f64>) -> EncodeParameters {
    EncodeParameters {
        code_block_width: 32,
        code_block_height: 32,
        style: CodeBlockStyle {
            termination_on_each_pass: true,
            predictable_termination: true,
            ..Default::default()
        },
        layer_rates,
        ..Default::default()
    }
}

fn squared_error(original: &[CodeBlock], decoded: &[Option<ebcot_rs::DecodedCodeBlock>]) -> f64 {
    original
        .iter()
        .zip(decoded.iter().flatten())
        .flat_map(|(block, decoded)| block.coefficients.iter().zip(&decoded.coefficients))
        .map(|(&a, &b)| {
            let d = a as f64 - b as f64;
            d * d
        })
        .sum()
}

#[test]
fn test_layered_decode_improves_with_each_layer() {
    let coefficients = subband(96, 80, 0xACE1);
    let blocks =
        CodeBlock::split_subband(&coefficients, 96, 80, SubbandOrientation::HH, 32, 32).unwrap();
    assert_eq!(blocks.len(), 9);

    let rates = vec![0.1, 0.4, 1.2, 0.0];
    let encoder = Tier1Encoder::new(exact_truncation_parameters(rates)).unwrap();
    let layered = encoder.encode(&blocks, coefficients.len()).unwrap();
    assert_eq!(layered.num_layers(), 4);

    let targets = encoder.parameters().layer_byte_targets(coefficients.len()).unwrap();
    for (layer, &target) in targets.iter().enumerate().take(3) {
        assert!(layered.layer_bytes(layer) <= target);
    }

    let mut previous_error = f64::INFINITY;
    let mut previous_reduction = 0.0;
    for layers in 1..=4 {
        let decoder = Tier1Decoder::new(DecodeParameters {
            reduce: 0,
            max_layers: Some(layers),
        })
        .unwrap();
        let decoded = decoder.decode(&layered, 1).unwrap();
        assert!(
            decoded
                .iter()
                .flatten()
                .all(|b| b.status == DecodeStatus::Complete)
        );

        let error = squared_error(&blocks, &decoded);
        assert!(error <= previous_error);
        previous_error = error;

        let reduction = layered.plan.layer_distortion(layers - 1);
        assert!(reduction >= previous_reduction);
        previous_reduction = reduction;
    }
    assert_eq!(previous_error, 0.0);
}

#[test]
fn test_layers_of_default_and_bypass_styles_decode_exactly() {
    let coefficients = subband(128, 128, 0x5151);
    let blocks =
        CodeBlock::split_subband(&coefficients, 128, 128, SubbandOrientation::HH, 32, 32).unwrap();
    let rates: Vec<f64> = (1..=12).map(|i| 0.05 * i as f64).chain([0.0]).collect();

    for style in [CodeBlockStyle::default(), CodeBlockStyle::from_bits(0x01)] {
        let parameters = EncodeParameters {
            code_block_width: 32,
            code_block_height: 32,
            style,
            layer_rates: rates.clone(),
            ..Default::default()
        };
        let layered = Tier1Encoder::new(parameters)
            .unwrap()
            .encode(&blocks, coefficients.len())
            .unwrap();
        assert_eq!(layered.num_layers(), 13);

        let mut previous_error = f64::INFINITY;
        for layers in 1..=13 {
            let decoder = Tier1Decoder::new(DecodeParameters {
                reduce: 0,
                max_layers: Some(layers),
            })
            .unwrap();
            let decoded = decoder.decode(&layered, 1).unwrap();

            for (index, block) in decoded.iter().enumerate() {
                let block = block.as_ref().unwrap();
                assert_eq!(block.status, DecodeStatus::Complete);

                let encoded = &layered.blocks[index];
                let num_passes = layered.plan.passes_included(index, layers - 1);
                let ends = encoded.pass_ends();
                let full = decode_code_block(
                    encoded.geometry(),
                    encoded.num_bit_planes,
                    style,
                    CodeBlockSegment {
                        data: &encoded.data,
                        pass_ends: &ends,
                    },
                    num_passes,
                )
                .unwrap();
                assert_eq!(
                    block.coefficients, full.coefficients,
                    "style {:#04x} block {} layers {}",
                    style.to_bits(), index, layers
                );
            }

            let error = squared_error(&blocks, &decoded);
            assert!(error <= previous_error);
            previous_error = error;
        }
        assert_eq!(previous_error, 0.0);
    }
}

#[test]
fn test_inclusion_never_shrinks_across_layers() {
    let coefficients = subband(64, 64, 77);
    let blocks =
        CodeBlock::split_subband(&coefficients, 64, 64, SubbandOrientation::LH, 16, 16).unwrap();
    let parameters = EncodeParameters {
        code_block_width: 16,
        code_block_height: 16,
        layer_rates: vec![0.05, 0.2, 0.2, 0.8, 2.0],
        ..Default::default()
    };
    let layered = Tier1Encoder::new(parameters)
        .unwrap()
        .encode(&blocks, coefficients.len())
        .unwrap();

    for block in 0..layered.blocks.len() {
        for layer in 1..layered.num_layers() {
            let before = layered.plan.inclusion(block, layer - 1);
            let after = layered.plan.inclusion(block, layer);
            assert!(after.passes >= before.passes);
            assert!(after.bytes >= before.bytes);
        }
        let last = layered.plan.inclusion(block, layered.num_layers() - 1);
        assert!(last.passes <= layered.blocks[block].num_passes());
        assert_eq!(last.bytes, layered.blocks[block].rate(last.passes));
    }

    // Equal budgets give equal layers.
    assert_eq!(layered.plan.layer(1), layered.plan.layer(2));
}

#[test]
fn test_layer_formation_is_idempotent() {
    let coefficients = subband(64, 32, 4242);
    let blocks =
        CodeBlock::split_subband(&coefficients, 64, 32, SubbandOrientation::HL, 32, 32).unwrap();
    let encoder = Tier1Encoder::new(exact_truncation_parameters(vec![0.3, 1.0])).unwrap();
    let layered = encoder.encode(&blocks, coefficients.len()).unwrap();

    let targets = encoder.parameters().layer_byte_targets(coefficients.len()).unwrap();
    let again = form_layers(&layered.blocks, &targets).unwrap();
    assert_eq!(again, layered.plan);
}

#[test]
fn test_two_block_scenario() {
    let pass = |bytes: usize, distortion: f64| {
        vec![CodingPass {
            index: 0,
            pass_type: PassType::Cleanup,
            bit_plane: 0,
            cumulative_rate: bytes,
            cumulative_distortion: distortion,
            terminated: true,
        }]
    };
    let blocks = vec![pass(10, 100.0), pass(20, 150.0)];
    let plan = form_layers(&blocks, &[15]).unwrap();
    assert_eq!(plan.passes_included(0, 0), 1);
    assert_eq!(plan.passes_included(1, 0), 0);
    assert_eq!(plan.layer_bytes(0), 10);
}

#[test]
fn test_reduce_skips_high_resolution_blocks() {
    let mut blocks = Vec::new();
    for resolution in 0..4u8 {
        let coefficients = subband(16, 16, 11 + resolution as u32);
        blocks.push(
            CodeBlock::new(16, 16, coefficients, SubbandOrientation::HL).with_resolution(resolution),
        );
    }
    let layered = Tier1Encoder::new(EncodeParameters::default())
        .unwrap()
        .encode(&blocks, 4 * 256)
        .unwrap();

    let decoder = Tier1Decoder::new(DecodeParameters {
        reduce: 1,
        max_layers: None,
    })
    .unwrap();
    let decoded = decoder.decode(&layered, 4).unwrap();
    for (block, decoded) in blocks.iter().zip(&decoded).take(3) {
        assert_eq!(decoded.as_ref().unwrap().coefficients, block.coefficients);
    }
    assert!(decoded[3].is_none());
}

#[test]
fn test_cinema_profiles_cap_the_budget() {
    let samples = 2048 * 1080;
    let targets = EncodeParameters {
        layer_rates: vec![0.5, 1000.0],
        ..Default::default()
    }
    .with_cinema_profile(CinemaProfile::Cinema2k24)
    .layer_byte_targets(samples)
    .unwrap();
    assert_eq!(targets, vec![1_041_666]);

    let targets = EncodeParameters {
        layer_rates: vec![0.0],
        ..Default::default()
    }
    .with_cinema_profile(CinemaProfile::Cinema2k48)
    .layer_byte_targets(samples)
    .unwrap();
    assert_eq!(targets, vec![520_833]);

    let parameters = EncodeParameters::default().with_cinema_profile(CinemaProfile::Cinema4k24);
    assert_eq!(parameters.code_block_width, 32);
    assert_eq!(parameters.code_block_height, 32);
    assert_eq!(CinemaProfile::Cinema4k24.max_resolutions(), 7);
}

#[test]
fn test_invalid_rates_are_rejected() {
    for rates in [vec![1.0, 0.5], vec![0.0, 1.0], vec![-1.0], vec![f64::NAN]] {
        assert_eq!(
            Tier1Encoder::new(EncodeParameters {
                layer_rates: rates,
                ..Default::default()
            })
            .unwrap_err(),
            Tier1Error::InvalidParameterLayerRate
        );
    }
}
