use chain_hash::DefaultHashBuilder;
use chain_hash::HashMap;
use chain_hash::LinkedHashMap;
use chain_hash::MaxEntries;
use chain_hash::OrderMode;
use clap::Parser;

#[derive(Parser, Debug)]
struct Args {
    #[arg(short = 'c', long = "target_capacity", default_value_t = 1000)]
    target_capacity: usize,

    /// Keep every n-th key before compacting.
    #[arg(short = 'k', long = "keep_every", default_value_t = 4)]
    keep_every: u64,

    /// Size of the LRU cache run at the end.
    #[arg(short = 'l', long = "lru_size", default_value_t = 64)]
    lru_size: usize,
}

fn main() {
    let args = Args::parse();

    println!(
        "Creating HashMap with target capacity: {}",
        args.target_capacity
    );

    let mut map: HashMap<u64, u64, DefaultHashBuilder> =
        HashMap::with_capacity(args.target_capacity);

    println!("Actual capacity: {}", map.capacity());
    println!("Filling map with u64 values...");

    let num_values = map.capacity() as u64;
    for i in 0..num_values {
        map.insert(i, i);
    }

    println!("Inserted {} values into map", map.len());
    println!(
        "Final load factor: {:.2}%",
        (map.len() as f64 / map.capacity() as f64) * 100.0
    );

    map.debug_stats().print();
    map.print_chain_histogram();

    let keep_every = args.keep_every.max(1);
    map.retain(|k, _| k % keep_every == 0);
    println!("Retained {} values, compacting...", map.len());
    map.shrink_to_fit();

    map.debug_stats().print();
    map.print_chain_histogram();

    if let Err(violation) = map.check_invariants() {
        eprintln!("Invariant violation: {violation}");
        std::process::exit(1);
    }

    let mut cache = LinkedHashMap::<u64, u64, DefaultHashBuilder>::with_mode(OrderMode::Access)
        .with_eviction(MaxEntries(args.lru_size));
    let mut hits = 0usize;
    let requests = num_values * 4;
    for i in 0..requests {
        let key = (i * i) % (args.lru_size as u64 * 2 + 1);
        if cache.get(&key).is_some() {
            hits += 1;
        } else {
            cache.insert(key, i);
        }
    }

    println!(
        "LRU cache of {}: {} hits over {} requests ({:.02}%)",
        args.lru_size,
        hits,
        requests,
        hits as f64 / requests.max(1) as f64 * 100.0
    );
    cache.debug_stats().print();
}
