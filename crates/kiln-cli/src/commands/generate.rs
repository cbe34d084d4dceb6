//! Generate command

use anyhow::{anyhow, Result};
use kiln_capture::{LayerData, LayerSpec};
use kiln_core::{bytes_to_pixels, FrameSize};
use kiln_gen::{
    save_image_asset, GenerationInput, GenerationOptions, KilnConfig, ModelOptions,
};
use std::path::Path;

pub struct GenerateArgs {
    pub prompt: String,
    pub input: Option<String>,
    pub output: String,
    pub name: Option<String>,
    pub width: u32,
    pub height: u32,
    pub seed: Option<u64>,
    pub iterations: u32,
    pub strength: f32,
    pub backend: Option<String>,
    pub model: String,
}

pub fn run(args: GenerateArgs) -> Result<()> {
    let config = KilnConfig::load().map_err(|e| anyhow!("{}", e))?;
    let backend = super::resolve_backend(args.backend.as_deref(), &config)?;

    // Layer list: a final-color layer when an input image steers generation
    let layers = if args.input.is_some() {
        vec![LayerSpec::final_color()]
    } else {
        Vec::new()
    };

    let model_options = ModelOptions::new(&args.model).with_layers(layers.clone());
    println!("Loading model {} on backend '{}'...", args.model, backend.name());
    if !backend.init_model(
        &model_options,
        config.generation.allow_unsafe_content,
        config.generation.padding_mode,
    ) {
        return Err(anyhow!("backend failed to initialise model '{}'", args.model));
    }

    let options = GenerationOptions {
        prompt: args.prompt.clone(),
        seed: args.seed,
        iterations: args.iterations,
        strength: args.strength,
        in_size: FrameSize::new(args.width, args.height),
        ..Default::default()
    };

    let mut input = GenerationInput::new(options);
    if let Some(path) = &args.input {
        let img = image::open(path)
            .map_err(|e| anyhow!("failed to read {}: {}", path, e))?
            .to_rgba8();
        let size = FrameSize::new(img.width(), img.height());
        input.options.in_size = size;

        let spec = &layers[0];
        input.layers.push(LayerData {
            processor: spec.create_processor(),
            pixels: bytes_to_pixels(img.as_raw()),
            size,
        });
        println!("Using {} ({}) as the final-color layer", path, size);
    }

    // Stream progress while the blocking generate call runs
    let (tx, rx) = std::sync::mpsc::channel();
    backend.set_progress_sender(tx);
    let progress_printer = std::thread::spawn(move || {
        while let Ok(update) = rx.recv() {
            println!(
                "  step {} ({:>3.0}%)",
                update.step + 1,
                update.progress * 100.0
            );
        }
    });

    let start = std::time::Instant::now();
    let result = backend.generate(&input);
    drop(backend);
    let _ = progress_printer.join();

    if let Some(error) = &result.error {
        return Err(anyhow!("generation failed: {}", error));
    }
    println!(
        "Generated {} in {:.1}s",
        result.size,
        start.elapsed().as_secs_f64()
    );

    let name = args.name.unwrap_or_else(|| slugify(&args.prompt));
    let saved = save_image_asset(Path::new(&args.output), &name, &result)
        .map_err(|e| anyhow!("{}", e))?;
    println!("Saved {}", saved.image_path.display());
    println!("Saved {}", saved.sidecar_path.display());

    Ok(())
}

fn slugify(prompt: &str) -> String {
    let slug: String = prompt
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    slug.split('_')
        .filter(|s| !s.is_empty())
        .take(6)
        .collect::<Vec<_>>()
        .join("_")
}
