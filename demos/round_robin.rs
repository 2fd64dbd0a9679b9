use myfiber::Runtime;

const CAPACITY: usize = 3;

fn main() -> myfiber::Result<()> {
    env_logger::init();

    let mut rt = Runtime::builder().capacity(CAPACITY).build()?;

    for round in 1..=2 {
        rt.spawn(|y| {
            for i in 0..3 {
                println!("{}: step {}", y.id(), i);
                y.yield_now();
            }
            println!("{}: end", y.id());
        })?;

        rt.spawn(|y| {
            for i in 0..5 {
                println!("{}: step {}", y.id(), i);
                y.yield_now();
            }
            println!("{}: end", y.id());
        })?;

        println!("Round {} with {} fibers...", round, CAPACITY);
        rt.run();
    }

    println!("All fibers completed!");
    Ok(())
}
