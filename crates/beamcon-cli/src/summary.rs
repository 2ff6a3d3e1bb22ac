use beamcon_core::beam::Beam;
use beamcon_core::pipeline::{CubesReport, ImagesReport, JobConfig};

use console::Style;

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    method: Style,
    disabled: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            method: Style::new().green(),
            disabled: Style::new().dim().yellow(),
            warning: Style::new().yellow().bold(),
            path: Style::new().underlined(),
        }
    }
}

fn underline(title: &str) -> String {
    "\u{2550}".repeat(title.chars().count())
}

fn beam_text(beam: &Beam) -> String {
    if beam.is_undefined() {
        "blanked".to_string()
    } else {
        beam.to_string()
    }
}

pub fn print_job_summary(kind: &str, config: &JobConfig, cubes: bool) {
    let s = Styles::new();
    let title = format!("Beamcon {kind}");

    println!();
    println!("  {}", s.title.apply_to(&title));
    println!("  {}", s.title.apply_to(underline(&title)));
    println!();

    println!(
        "  {:<14}{}",
        s.label.apply_to("Inputs"),
        s.value.apply_to(config.inputs.len())
    );
    match &config.output.dir {
        Some(dir) => println!(
            "  {:<14}{}",
            s.label.apply_to("Output"),
            s.path.apply_to(dir.display())
        ),
        None => println!(
            "  {:<14}{}",
            s.label.apply_to("Output"),
            s.disabled.apply_to("beside inputs")
        ),
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Scheduler"),
        s.method.apply_to(config.scheduler)
    );
    if cubes {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Mode"),
            s.method.apply_to(config.mode)
        );
    }
    if config.dry_run {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Dry run"),
            s.warning.apply_to("no images will be written")
        );
    }
    println!();

    println!("  {}", s.header.apply_to("Resolution"));
    match config.target.resolve() {
        Ok(Some(target)) => println!(
            "    {:<12}{}",
            s.label.apply_to("Target"),
            s.value.apply_to(target)
        ),
        _ => println!(
            "    {:<12}{}",
            s.label.apply_to("Target"),
            s.method.apply_to("smallest common beam")
        ),
    }
    match config.cutoff {
        Some(cutoff) => println!(
            "    {:<12}{}",
            s.label.apply_to("Cutoff"),
            s.value.apply_to(format!("{cutoff}\""))
        ),
        None => println!(
            "    {:<12}{}",
            s.label.apply_to("Cutoff"),
            s.disabled.apply_to("none")
        ),
    }
    if cubes && !config.mask_channels.is_empty() {
        println!(
            "    {:<12}{:?}",
            s.label.apply_to("Masked"),
            config.mask_channels
        );
    }
    println!();
}

pub fn print_images_report(report: &ImagesReport) {
    let s = Styles::new();

    println!();
    if let Some(common) = &report.common {
        println!(
            "  {:<14}{}",
            s.label.apply_to("Common beam"),
            s.value.apply_to(common)
        );
    }
    if let Some(warning) = &report.warning {
        println!("  {}", s.warning.apply_to(warning));
    }
    println!(
        "  {:<14}{}",
        s.label.apply_to("Final beam"),
        s.value.apply_to(report.final_beam)
    );
    println!();

    for image in &report.images {
        println!("  {}", s.path.apply_to(image.input.display()));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Original"),
            s.value.apply_to(image.original)
        );
        match image.plan.convolution() {
            Some((beam, factor)) => {
                println!(
                    "    {:<12}{}",
                    s.label.apply_to("Convolving"),
                    s.value.apply_to(beam)
                );
                println!(
                    "    {:<12}{}",
                    s.label.apply_to("Factor"),
                    s.value.apply_to(format!("{factor:.6}"))
                );
            }
            None => println!(
                "    {:<12}{}",
                s.label.apply_to("Convolving"),
                s.disabled.apply_to("blanked")
            ),
        }
        if !report.dry_run {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Output"),
                s.path.apply_to(image.output.display())
            );
        }
    }
    println!();
}

pub fn print_cubes_report(report: &CubesReport) {
    let s = Styles::new();

    println!();
    println!("  {}", s.header.apply_to(format!("Common beams ({})", report.mode)));
    for (chan, beam) in report.commons.iter().enumerate() {
        println!(
            "    {:<12}{}",
            s.label.apply_to(format!("chan {chan}")),
            s.value.apply_to(beam_text(beam))
        );
    }
    for warning in &report.warnings {
        println!("  {}", s.warning.apply_to(warning));
    }
    println!();

    for cube in &report.cubes {
        println!("  {}", s.path.apply_to(cube.input.display()));
        println!(
            "    {:<12}{}",
            s.label.apply_to("Blanked"),
            s.value.apply_to(format!("{} of {} channels", cube.blanked, cube.channels))
        );
        println!(
            "    {:<12}{}",
            s.label.apply_to("Log"),
            s.path.apply_to(cube.convolution_log.display())
        );
        if !report.dry_run {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Output"),
                s.path.apply_to(cube.output.display())
            );
        }
    }
    println!();
}
