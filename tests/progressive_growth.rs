//! Integration tests for progressive growth of both networks

use deep_privacy_pgan::data::{preprocess_batch, DataLoader, DataSource};
use deep_privacy_pgan::model::{
    AvgPool2x, Discriminator, DiscriminatorConfig, Generator, GeneratorConfig, Upsample2x,
};
use deep_privacy_pgan::training::{finite_check, TransitionSchedule};
use deep_privacy_pgan::ProgressiveGan;
use ndarray::{Array2, Array4};
use tch::nn::{Module, VarStore};
use tch::{Device, Kind, Tensor};

/// Zero noise through the default-sized networks, then grow both to 8x8
#[test]
fn test_end_to_end_growth_scenario() {
    let gen_vs = VarStore::new(Device::Cpu);
    let disc_vs = VarStore::new(Device::Cpu);
    let mut generator = Generator::new(&gen_vs.root(), GeneratorConfig::default());
    let mut discriminator = Discriminator::new(
        &disc_vs.root(),
        DiscriminatorConfig {
            image_channels: 1,
            imsize: 4,
            ..Default::default()
        },
    );

    let z = Tensor::zeros([64, 128, 1, 1], (Kind::Float, Device::Cpu));
    let data = generator.forward(&z, 1.0).unwrap();
    assert_eq!(data.size(), vec![64, 1, 4, 4]);

    let logits = discriminator.forward(&data, 1.0).unwrap();
    assert_eq!(logits.size(), vec![64, 1]);

    discriminator.extend(&disc_vs.root(), 32).unwrap();
    generator.extend(&gen_vs.root(), 32).unwrap();

    let grown = generator.forward(&z, 0.0).unwrap();
    assert_eq!(grown.size(), vec![64, 1, 8, 8]);
    assert!(grown.allclose(&Upsample2x.forward(&data), 1e-4, 1e-5, false));

    let grown_logits = discriminator.forward(&grown, 0.0).unwrap();
    assert_eq!(grown_logits.size(), vec![64, 1]);
    // Pooling the upsampled image gives back `data`, so the old path scores it identically.
    assert!(grown_logits.allclose(&logits, 1e-4, 1e-5, false));
}

#[test]
fn test_discriminator_old_path_absorbs_larger_input() {
    let vs = VarStore::new(Device::Cpu);
    let mut disc = Discriminator::new(
        &vs.root(),
        DiscriminatorConfig {
            base_channels: 32,
            ..Default::default()
        },
    );

    let x = Tensor::rand([5, 1, 8, 8], (Kind::Float, Device::Cpu)) * 2.0 - 1.0;
    let before = disc.forward(&AvgPool2x.forward(&x), 1.0).unwrap();
    disc.extend(&vs.root(), 16).unwrap();

    let after = disc.forward(&x, 0.0).unwrap();
    assert!(after.allclose(&before, 1e-4, 1e-5, false));
}

#[test]
fn test_resolution_sequence() {
    let mut model = ProgressiveGan::new(
        GeneratorConfig {
            noise_dim: 8,
            base_channels: 8,
            ..Default::default()
        },
        DiscriminatorConfig {
            base_channels: 8,
            ..Default::default()
        },
        Device::Cpu,
    );

    let mut resolutions = vec![model.resolution()];
    for _ in 0..4 {
        model.grow(4).unwrap();
        resolutions.push(model.resolution());
        assert_eq!(model.discriminator.current_imsize(), model.resolution());
    }
    assert_eq!(resolutions, vec![4, 8, 16, 32, 64]);

    let images = model.generate(1, 0.25).unwrap();
    assert_eq!(images.size(), vec![1, 1, 64, 64]);
}

/// A few adversarial steps through a fading stage, fed from the in-memory loader
#[test]
fn test_training_steps_through_transition() {
    tch::manual_seed(0);
    let mut model = ProgressiveGan::new(
        GeneratorConfig {
            noise_dim: 16,
            base_channels: 16,
            ..Default::default()
        },
        DiscriminatorConfig {
            base_channels: 16,
            ..Default::default()
        },
        Device::Cpu,
    );
    model.grow(8).unwrap();

    let images = Array4::<u8>::from_shape_fn((8, 1, 8, 8), |(n, _, h, w)| ((n + h * w) * 3) as u8);
    let conditions = Array4::<u8>::zeros((8, 1, 8, 8));
    let landmarks = Array2::<f32>::zeros((8, 14));
    let mut loader = DataLoader::new(images, conditions, landmarks, 4, true, true).unwrap();

    let schedule = TransitionSchedule::new(8, 8);
    let mut gen_opt = model.gen_optimizer(1e-3).unwrap();
    let mut disc_opt = model.disc_optimizer(1e-3).unwrap();
    let mut images_seen = 0u64;

    loader.reset();
    while let Some(batch) = loader.next_batch() {
        let t = schedule.progress(images_seen);
        let sample = preprocess_batch(&batch, t, 7, Device::Cpu).unwrap();
        let batch_size = sample.image.size()[0];

        let fake = model.generate(batch_size, t).unwrap();
        let d_loss = model
            .discriminate(&fake.detach(), t)
            .unwrap()
            .mean(Kind::Float)
            - model.discriminate(&sample.image, t).unwrap().mean(Kind::Float);
        disc_opt.zero_grad();
        d_loss.backward();
        assert!(finite_check(&model.disc_vs.trainable_variables()));
        disc_opt.step();

        let g_loss = -model
            .discriminate(&model.generate(batch_size, t).unwrap(), t)
            .unwrap()
            .mean(Kind::Float);
        gen_opt.zero_grad();
        g_loss.backward();
        assert!(finite_check(&model.gen_vs.trainable_variables()));
        gen_opt.step();

        images_seen += batch_size as u64;
    }

    assert_eq!(images_seen, 8);
    assert_eq!(schedule.progress(images_seen), 1.0);
    assert!(!schedule.should_grow(images_seen));
}
