use clap::Parser;
use gridload::domain::DomainSpec;
use gridload::units::UnitOverrides;
use gridload::{Dataset, FieldInput, UniformGridConfig, Validation};
use ndarray::Array3;

#[derive(Debug, Parser)]
#[clap(version = "1.0", author = "J. Zrake <jzrake@clemson.edu>")]
struct Opts {
    #[clap(short = 'p', long, default_value = "64")]
    nprocs: usize,

    #[clap(short = 'n', long, default_value = "64")]
    cells: usize,

    #[clap(short = 'w', long, default_value = "1.5")]
    half_width: f64,

    #[clap(short = 'l', long, default_value = "kpc")]
    length_unit: String,

    #[clap(long)]
    strict: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    simple_logger::SimpleLogger::new().init()?;

    let opts = Opts::parse();
    println!("{:?}", opts);

    let n = opts.cells;
    let h = opts.half_width;
    let density = Array3::from_shape_fn((n, n, n), |(i, j, k)| {
        let r2 = [i, j, k]
            .iter()
            .map(|&m| (2.0 * h * (m as f64 + 0.5) / n as f64 - h).powi(2))
            .sum::<f64>();
        (-r2).exp()
    });

    let config = UniformGridConfig::new([n, n, n])
        .with_field("density", FieldInput::new(density, "code_mass/code_length**3"))
        .with_nprocs(opts.nprocs)
        .with_domain(DomainSpec::default().with_bbox([-h; 3], [h; 3]))
        .with_units(UnitOverrides::default().with_length(opts.length_unit.as_str()).with_mass("Msun"))
        .with_validation(if opts.strict { Validation::Strict } else { Validation::Report });

    let start = std::time::Instant::now();
    let loaded = Dataset::load_uniform_grid(config)?;
    let elapsed = start.elapsed().as_secs_f64();
    let dataset = &loaded.dataset;

    println!();
    println!("grids ................. {}", dataset.num_grids());
    println!("levels ................ {}", dataset.max_level() + 1);
    println!("domain dimensions ..... {:?}", dataset.domain_dimensions());
    println!("diagnostics ........... {}", loaded.diagnostics.len());
    println!("load time ............. {}s", elapsed);

    for (id, grid) in dataset.grids().take(4) {
        let (values, unit) = dataset.field(id, "density").ok_or("missing density")?;
        println!(
            "grid {:>4} {:?}..{:?} mean density {:.4e} g/cm^3",
            id,
            grid.left_edge(),
            grid.right_edge(),
            unit.to_reference(values.mean().unwrap_or(0.0)));
    }
    Ok(())
}
