use linux_embedded_hal::{Delay, I2cdev};
use ms5837::{Builder, DeviceType, Oversampling};

fn main() {
    let i2c = I2cdev::new("/dev/i2c-1").expect("I2C device");

    //initialize the sensor through i2c
    let mut sensor = Builder::new_i2c_default(i2c);

    //you need to implement an delay_source
    let mut delay_source = Delay {};

    println!("{:?}", ms5837::info());

    sensor
        .setup(DeviceType::Ms5837_30BA26, &mut delay_source)
        .expect("error setup");
    println!("Found {:?}", sensor.device_type());

    sensor
        .set_pressure_osr(Oversampling::Osr_2048)
        .expect("error set_pressure_osr");

    for _ in 0..10 {
        let m = sensor
            .read_temperature_pressure(&mut delay_source)
            .expect("error read");
        println!(
            "Temperature: {:.2} C  Pressure: {:.2} mbar",
            m.temperature.celsius, m.pressure.mbar
        );
    }

    sensor.deinit(&mut delay_source).expect("error deinit");
}
