use imgclass_nn::{Hyperparams, Network, Topology};

fn main() -> imgclass_nn::Result<()> {
    let hyperparams = Hyperparams { learning_rate: 0.5, ..Hyperparams::default() };
    let mut network = Network::with_hyperparams(Topology::new(2, 1, 1, 4), hyperparams)?;

    let inputs = vec![
        vec![1.0, 0.0],
        vec![1.0, 1.0],
        vec![0.0, 1.0],
        vec![0.0, 0.0],
    ];
    let expected_outputs = vec![
        vec![1.0],
        vec![0.0],
        vec![1.0],
        vec![0.0],
    ];

    let epochs = 20000;

    for epoch in 0..epochs {
        network.train_batch_averaged(&inputs, &expected_outputs, 1)?;
        if epoch % 2000 == 0 {
            let error = network.error_batch(&inputs, &expected_outputs)?;
            println!("Epoch {epoch}: error = {error:.6}");
        }
    }

    for input in &inputs {
        println!("Input: {:?} -> Output: {:.4}", input, network.forward(input)?[0]);
    }
    Ok(())
}
