//! Performance benchmarks for the DSP stages

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use farfield_synth::dsp::butterworth::{FilterPhase, SosFilter};
use farfield_synth::dsp::convolve::convolve_full;
use farfield_synth::effects::{apply_phone_band, EffectEngine, EffectParameters, PhoneBandParameters};
use farfield_synth::noise::stack;
use farfield_synth::SampleBuffer;

fn signal(len: usize, freq: f32) -> SampleBuffer {
    SampleBuffer::new(
        (0..len)
            .map(|i| (i as f32 * freq * 2.0 * std::f32::consts::PI / 16000.0).sin() * 0.5)
            .collect(),
        16000,
    )
}

fn bench_convolution(c: &mut Criterion) {
    // 5 seconds of speech against a 0.5 s room response
    let speech = signal(16000 * 5, 220.0);
    let ir: Vec<f32> = (0..8000).map(|i| (-(i as f32) / 800.0).exp()).collect();

    c.bench_function("convolve_room_5s", |b| {
        b.iter(|| convolve_full(black_box(&speech.samples), black_box(&ir)));
    });
}

fn bench_effects(c: &mut Criterion) {
    let speech = signal(16000 * 5, 220.0);
    let engine = EffectEngine::default();
    let params = EffectParameters {
        tempo_rate: Some(1.1),
        pitch_steps: Some(2),
        ..EffectParameters::default()
    };

    c.bench_function("tempo_pitch_5s", |b| {
        b.iter(|| engine.render(black_box(&speech), black_box(&params)));
    });

    let filter = SosFilter::lowpass(4, 4000.0, 16000).unwrap();
    c.bench_function("lowpass_zero_phase_5s", |b| {
        b.iter(|| filter.apply(black_box(&speech.samples), FilterPhase::ZeroPhase));
    });

    let phone = PhoneBandParameters::default();
    c.bench_function("phone_band_5s", |b| {
        b.iter(|| apply_phone_band(black_box(&speech), black_box(&phone)));
    });
}

fn bench_stack(c: &mut Criterion) {
    let speech = signal(16000 * 5, 220.0);
    let noise = signal(16000 * 5, 1234.0);

    c.bench_function("stack_5s", |b| {
        b.iter(|| stack(black_box(&speech), black_box(&noise), black_box(10.0)));
    });
}

criterion_group!(benches, bench_convolution, bench_effects, bench_stack);
criterion_main!(benches);
