use std::time::{Duration, Instant};

use hbst::{CollectionId, Descriptor, Matchable, Tree, TreeConfig};

use clap::Parser;
use kdam::tqdm;
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use serde_json::json;

const DESCRIPTOR_BITS: usize = 256;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {

    //Number of synthetic images, the tree is built on the first one and grown with the rest
    #[arg(short, long, default_value_t = 10)]
    images: usize,

    //Descriptors generated per image
    #[arg(short, long, default_value_t = 10000)]
    descriptors: usize,

    //Bits flipped per descriptor between consecutive images, 256 makes them unrelated
    #[arg(short, long, default_value_t = 8)]
    flips: usize,

    //Largest Hamming distance reported as a match
    #[arg(short, long, default_value_t = 25)]
    max_distance: u32,

    //Seed for descriptor generation
    #[arg(short, long, default_value_t = 0)]
    seed: u64,

    //Optional TreeConfig yaml file
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Serialize, Debug)]
struct PairSummary {
    query: CollectionId,
    reference: CollectionId,
    matches: usize,
    matching_ratio: f64,
}

/// Next image of a synthetic sequence: every descriptor of `previous` with `flips` random bits flipped
fn next_image(previous: &[Descriptor<DESCRIPTOR_BITS>], flips: usize, rng: &mut StdRng) -> Vec<Descriptor<DESCRIPTOR_BITS>> {

    previous
        .iter()
        .map(|descriptor| {
            let flipped: Vec<usize> = (0..flips).map(|_| rng.gen_range(0..DESCRIPTOR_BITS)).collect();
            Descriptor::from_fn(|bit| descriptor.bit(bit) ^ (flipped.iter().filter(|f| **f == bit).count() % 2 == 1))
        })
        .collect()
}

fn to_matchables(descriptors: &[Descriptor<DESCRIPTOR_BITS>], image: CollectionId) -> Vec<Matchable<DESCRIPTOR_BITS>> {

    descriptors
        .iter()
        .enumerate()
        .map(|(index, descriptor)| Matchable::with_index(index as u64, descriptor.clone(), image))
        .collect()
}

fn main() -> Result<(), Box<dyn std::error::Error>> {

    env_logger::init();

    let args = Args::parse();

    let config = match &args.config {
        Some(filename) => TreeConfig::from_file(filename)?,
        None => TreeConfig::default(),
    };
    info!("{:?}", &config);

    let number_of_images = args.images.max(1);
    let mut rng = StdRng::seed_from_u64(args.seed);

    let mut descriptors: Vec<Vec<Descriptor<DESCRIPTOR_BITS>>> = Vec::with_capacity(number_of_images);
    descriptors.push((0..args.descriptors).map(|_| Descriptor::random(&mut rng)).collect());
    for image in 1..number_of_images {
        let image = next_image(&descriptors[image - 1], args.flips, &mut rng);
        descriptors.push(image);
    }

    let images: Vec<Vec<Matchable<DESCRIPTOR_BITS>>> = descriptors
        .iter()
        .enumerate()
        .map(|(image, descriptors)| to_matchables(descriptors, image as CollectionId))
        .collect();

    let strategy = config.strategy;

    let start = Instant::now();
    let mut tree = Tree::with_config(0, images[0].clone(), config)?;
    for image in tqdm!(images.iter().skip(1)) {
        tree.add(image.clone(), strategy);
    }
    let construction = start.elapsed();
    info!("built tree of {} matchables in {:.3}s", tree.size(), construction.as_secs_f64());

    //every image against every other and itself, the diagonal should be close to a ratio of 1
    let mut pairs: Vec<PairSummary> = Vec::with_capacity(number_of_images * number_of_images);
    let mut query_duration = Duration::ZERO;

    for (query, matchables) in images.iter().enumerate() {

        let start = Instant::now();
        let grouped = tree.match_grouped(matchables, args.max_distance);
        query_duration += start.elapsed();

        for (reference, reference_matchables) in images.iter().enumerate() {

            let matches = grouped.get(&(reference as CollectionId)).map_or(0, |m| m.len());
            let matching_ratio = match reference_matchables.is_empty() {
                true => 0.0,
                false => matches as f64 / reference_matchables.len() as f64,
            };

            info!("matches for query [{:02}] to reference [{:02}]: {:5} (matching ratio: {:5.3})", query, reference, matches, matching_ratio);

            pairs.push(PairSummary {
                query: query as CollectionId,
                reference: reference as CollectionId,
                matches,
                matching_ratio,
            });
        }
    }

    let average_ratio = pairs.iter().map(|p| p.matching_ratio).sum::<f64>() / pairs.len() as f64;

    let summary = json!({
        "max_distance": args.max_distance,
        "construction_seconds": construction.as_secs_f64(),
        "average_query_seconds": query_duration.as_secs_f64() / number_of_images as f64,
        "average_matching_ratio": average_ratio,
        "pairs": pairs,
        "statistics": tree.statistics(),
    });

    println!("{}", serde_json::to_string_pretty(&summary)?);

    Ok(())
}
